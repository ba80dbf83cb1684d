use std::fs;
use std::path::Path;

use chrono::Utc;
use tracing::warn;

use fable_core::turn::{Role, Turn};

use crate::error::StoreError;

/// Result of a lenient load: the turns that parsed, plus how many lines were
/// skipped as unreadable.
#[derive(Debug)]
pub struct LoadOutcome {
    pub turns: Vec<Turn>,
    pub skipped: usize,
}

/// Write a session transcript as a human-editable text file, one turn per
/// line in `role|text` form. Newlines and backslashes in the text are
/// escaped so the line structure survives a round trip. The write goes to a
/// sibling temp file first and is renamed into place, so an interrupted save
/// never truncates an existing file.
pub fn save_turns(path: &Path, turns: &[Turn], model: &str) -> Result<(), StoreError> {
    let mut out = String::new();
    out.push_str("# fable session\n");
    out.push_str(&format!("# saved_at: {}\n", Utc::now().to_rfc3339()));
    out.push_str(&format!("# model: {model}\n"));
    for turn in turns {
        out.push_str(turn.role.tag());
        out.push('|');
        out.push_str(&escape(&turn.text));
        out.push('\n');
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);
    fs::write(tmp, out)?;
    fs::rename(tmp, path)?;
    Ok(())
}

/// Load a transcript saved by [`save_turns`], tolerating hand edits: header
/// comments and blank lines are ignored, and lines that fail to parse are
/// skipped with a warning rather than aborting the load. Sequence indices
/// are reassigned from zero in file order. A file with no usable turn at all
/// is an error.
pub fn load_turns(path: &Path) -> Result<LoadOutcome, StoreError> {
    let raw = fs::read_to_string(path)?;

    let mut turns = Vec::new();
    let mut skipped = 0usize;

    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((tag, text)) = line.split_once('|') else {
            warn!(path = %path.display(), line = lineno + 1, "skipping line without a role separator");
            skipped += 1;
            continue;
        };
        let Some(role) = Role::from_tag(tag.trim()) else {
            warn!(path = %path.display(), line = lineno + 1, tag = tag.trim(), "skipping line with unknown role");
            skipped += 1;
            continue;
        };
        let index = turns.len() as u64;
        turns.push(Turn::new(role, unescape(text), index));
    }

    if turns.is_empty() {
        return Err(StoreError::CorruptSession(path.to_path_buf()));
    }

    Ok(LoadOutcome { turns, skipped })
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            // Unknown escape: keep it literally rather than guessing.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_turns() -> Vec<Turn> {
        vec![
            Turn::new(Role::System, "You are the Dungeon Master.", 0),
            Turn::new(Role::Narrator, "You wake in a cell.\nIt is dark.", 1),
            Turn::new(Role::User, "look | around \\ carefully", 2),
        ]
    }

    #[test]
    fn round_trip_preserves_roles_order_and_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("adventure.txt");

        save_turns(&path, &sample_turns(), "qwen3-vl:4b").unwrap();
        let outcome = load_turns(&path).unwrap();

        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.turns.len(), 3);
        assert_eq!(outcome.turns[0].role, Role::System);
        assert_eq!(outcome.turns[1].text, "You wake in a cell.\nIt is dark.");
        assert_eq!(outcome.turns[2].text, "look | around \\ carefully");
        let indices: Vec<u64> = outcome.turns.iter().map(|t| t.sequence_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn header_comments_and_blank_lines_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edited.txt");
        fs::write(
            &path,
            "# my notes\n\nuser|hello\n\n# mid-file comment\nnarrator|hi\n",
        )
        .unwrap();

        let outcome = load_turns(&path).unwrap();
        assert_eq!(outcome.turns.len(), 2);
        assert_eq!(outcome.skipped, 0);
    }

    #[test]
    fn unreadable_lines_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mangled.txt");
        fs::write(
            &path,
            "user|fine\ngarbage without separator\nwizard|unknown role\nnarrator|also fine\n",
        )
        .unwrap();

        let outcome = load_turns(&path).unwrap();
        assert_eq!(outcome.turns.len(), 2);
        assert_eq!(outcome.skipped, 2);
        // Indices are reassigned contiguously despite the gaps.
        assert_eq!(outcome.turns[1].sequence_index, 1);
    }

    #[test]
    fn no_usable_turns_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "# header only\n\nnot a turn\n").unwrap();

        assert!(matches!(
            load_turns(&path),
            Err(StoreError::CorruptSession(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.txt");
        assert!(matches!(load_turns(&path), Err(StoreError::Io(_))));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saves/deep/adventure.txt");
        save_turns(&path, &sample_turns(), "m").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn overwrite_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("adventure.txt");
        save_turns(&path, &sample_turns(), "m").unwrap();
        save_turns(&path, &sample_turns(), "m").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn pipe_in_text_survives() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipes.txt");
        let turns = vec![Turn::new(Role::User, "a|b|c", 0)];
        save_turns(&path, &turns, "m").unwrap();
        let outcome = load_turns(&path).unwrap();
        assert_eq!(outcome.turns[0].text, "a|b|c");
    }
}
