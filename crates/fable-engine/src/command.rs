use crate::error::EngineError;

/// A recognized control command. Constructed and consumed within one
/// dispatch; never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    ToggleCensor,
    Redo,
    Save { path: Option<String> },
    Load { path: Option<String> },
    ChangeModel { model: Option<String> },
    Status,
    Exit,
}

/// What one input line means: a control command or free narrative text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Narrative(String),
}

/// Classify one line of player input. Lines starting with `/` are commands;
/// everything else is narrative, passed through verbatim. Whitespace-only
/// input counts as narrative with empty text.
pub fn parse(line: &str) -> Result<Input, EngineError> {
    if line.trim().is_empty() {
        return Ok(Input::Narrative(String::new()));
    }

    let trimmed = line.trim_start();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Input::Narrative(line.to_string()));
    };

    let mut parts = rest.trim().splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("").to_ascii_lowercase();
    let arg = parts
        .next()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);

    let command = match name.as_str() {
        "help" | "?" => Command::Help,
        "censored" => Command::ToggleCensor,
        "redo" => Command::Redo,
        "save" => Command::Save { path: arg },
        "load" => Command::Load { path: arg },
        "change" => Command::ChangeModel { model: arg },
        "status" => Command::Status,
        "exit" => Command::Exit,
        _ => return Err(EngineError::UnknownCommand(name)),
    };
    Ok(Input::Command(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn censored_toggles() {
        assert_eq!(parse("/censored").unwrap(), Input::Command(Command::ToggleCensor));
    }

    #[test]
    fn plain_text_is_narrative_verbatim() {
        assert_eq!(
            parse("hello wizard").unwrap(),
            Input::Narrative("hello wizard".into())
        );
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(matches!(
            parse("/bogus"),
            Err(EngineError::UnknownCommand(name)) if name == "bogus"
        ));
    }

    #[test]
    fn whitespace_only_is_empty_narrative() {
        assert_eq!(parse("   \t ").unwrap(), Input::Narrative(String::new()));
        assert_eq!(parse("").unwrap(), Input::Narrative(String::new()));
    }

    #[test]
    fn commands_are_case_insensitive() {
        assert_eq!(parse("/HELP").unwrap(), Input::Command(Command::Help));
        assert_eq!(parse("/Exit").unwrap(), Input::Command(Command::Exit));
    }

    #[test]
    fn question_mark_is_help_alias() {
        assert_eq!(parse("/?").unwrap(), Input::Command(Command::Help));
    }

    #[test]
    fn save_and_load_take_optional_paths() {
        assert_eq!(
            parse("/save saves/run two.txt").unwrap(),
            Input::Command(Command::Save {
                path: Some("saves/run two.txt".into())
            })
        );
        assert_eq!(parse("/load").unwrap(), Input::Command(Command::Load { path: None }));
    }

    #[test]
    fn change_takes_a_model_argument() {
        assert_eq!(
            parse("/change qwen3-vl:4b").unwrap(),
            Input::Command(Command::ChangeModel {
                model: Some("qwen3-vl:4b".into())
            })
        );
    }

    #[test]
    fn leading_whitespace_before_slash_still_parses() {
        assert_eq!(parse("  /redo").unwrap(), Input::Command(Command::Redo));
    }

    #[test]
    fn narrative_keeps_internal_slashes() {
        assert_eq!(
            parse("look at the a/b sign").unwrap(),
            Input::Narrative("look at the a/b sign".into())
        );
    }
}
