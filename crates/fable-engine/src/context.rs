use tracing::debug;

use fable_core::prompt::{ContentPolicy, PromptContext};
use fable_core::turn::{Role, Turn};

use crate::error::EngineError;

/// Ordered transcript of the session, bounded by a character budget.
///
/// System turns are pinned: they count toward the budget but are never
/// evicted. When an append pushes past the budget, the oldest non-pinned
/// turns go first; the turn being appended is itself never evicted. If the
/// budget cannot be met that way, append fails.
pub struct ContextStore {
    turns: Vec<Turn>,
    next_index: u64,
    budget_chars: usize,
}

impl ContextStore {
    pub fn new(budget_chars: usize) -> Self {
        Self {
            turns: Vec::new(),
            next_index: 0,
            budget_chars,
        }
    }

    pub fn budget_chars(&self) -> usize {
        self.budget_chars
    }

    pub fn used_chars(&self) -> usize {
        self.turns.iter().map(|t| t.chars()).sum()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append one turn, evicting the oldest non-pinned turns if the budget
    /// is exceeded.
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> Result<(), EngineError> {
        let turn = Turn::new(role, text, self.next_index);
        self.next_index += 1;
        self.turns.push(turn);
        self.evict_to_budget()
    }

    fn evict_to_budget(&mut self) -> Result<(), EngineError> {
        let mut used = self.used_chars();
        while used > self.budget_chars {
            // The just-appended turn is never an eviction candidate; it would
            // vanish from the transcript the caller believes it committed to.
            let newest = self.turns.len().saturating_sub(1);
            let Some(pos) = self.turns[..newest].iter().position(|t| !t.role.is_pinned()) else {
                return Err(EngineError::CapacityExceeded {
                    used,
                    budget: self.budget_chars,
                });
            };
            let evicted = self.turns.remove(pos);
            debug!(
                sequence_index = evicted.sequence_index,
                chars = evicted.chars(),
                "evicted turn to stay within context budget"
            );
            used = self.used_chars();
        }
        Ok(())
    }

    /// Immutable ordered view for prompt assembly: pinned turns first (in
    /// their own order), then the rest in append order.
    pub fn snapshot(&self) -> Vec<Turn> {
        let mut view: Vec<Turn> = self
            .turns
            .iter()
            .filter(|t| t.role.is_pinned())
            .cloned()
            .collect();
        view.extend(self.turns.iter().filter(|t| !t.role.is_pinned()).cloned());
        view
    }

    /// Remove the most recent turn with the given role. No-op when none
    /// exists.
    pub fn remove_last(&mut self, role: Role) -> bool {
        if let Some(pos) = self.turns.iter().rposition(|t| t.role == role) {
            self.turns.remove(pos);
            true
        } else {
            false
        }
    }

    /// Replace the whole transcript, used by load. Indices are expected to be
    /// contiguous from zero; the next append continues after them.
    pub fn replace(&mut self, turns: Vec<Turn>) {
        self.next_index = turns.len() as u64;
        self.turns = turns;
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Compose the outbound prompt: pinned system text folded into the
    /// system block, the rest as the conversation.
    pub fn prompt_context(&self, policy: ContentPolicy) -> PromptContext {
        let system = self
            .turns
            .iter()
            .filter(|t| t.role.is_pinned())
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let turns = self
            .turns
            .iter()
            .filter(|t| !t.role.is_pinned())
            .cloned()
            .collect();
        PromptContext {
            system,
            turns,
            policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_preserves_append_order_with_pinned_first() {
        let mut store = ContextStore::new(1_000);
        store.append(Role::User, "first").unwrap();
        store.append(Role::System, "setup").unwrap();
        store.append(Role::Narrator, "second").unwrap();

        let view = store.snapshot();
        assert_eq!(view[0].role, Role::System);
        assert_eq!(view[1].text, "first");
        assert_eq!(view[2].text, "second");
    }

    #[test]
    fn sequence_indices_strictly_increase() {
        let mut store = ContextStore::new(1_000);
        for i in 0..5 {
            store.append(Role::User, format!("turn {i}")).unwrap();
        }
        let indices: Vec<u64> = store.turns().iter().map(|t| t.sequence_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn oldest_non_pinned_evicted_first() {
        let mut store = ContextStore::new(30);
        store.append(Role::System, "pinned....").unwrap(); // 10 chars
        store.append(Role::User, "aaaaaaaaaa").unwrap(); // 10
        store.append(Role::Narrator, "bbbbbbbbbb").unwrap(); // 10
        assert_eq!(store.len(), 3);

        store.append(Role::User, "cccccccccc").unwrap();
        assert_eq!(store.len(), 3);
        assert!(!store.turns().iter().any(|t| t.text == "aaaaaaaaaa"));
        assert!(store.turns().iter().any(|t| t.text == "pinned...."));
    }

    #[test]
    fn pinned_never_evicted_even_under_pressure() {
        let mut store = ContextStore::new(25);
        store.append(Role::System, "pinned....").unwrap();
        store.append(Role::System, "pinned2...").unwrap();
        store.append(Role::User, "xxxxx").unwrap();

        // A big append evicts every non-pinned turn but keeps both pinned.
        store.append(Role::User, "yyyy").unwrap();
        let pinned: Vec<_> = store
            .turns()
            .iter()
            .filter(|t| t.role.is_pinned())
            .collect();
        assert_eq!(pinned.len(), 2);
    }

    #[test]
    fn budget_smaller_than_pinned_content_is_fatal() {
        let mut store = ContextStore::new(5);
        let err = store
            .append(Role::System, "this pinned turn is far too long")
            .unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn never_evicts_the_turn_just_appended() {
        let mut store = ContextStore::new(20);
        store.append(Role::System, "pinned....").unwrap(); // 10 chars
        let err = store.append(Role::Narrator, "a".repeat(15)).unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded { .. }));
        // The oversized narration stays in the transcript for the autosave.
        assert!(store.turns().iter().any(|t| t.role == Role::Narrator));
    }

    #[test]
    fn big_append_evicts_older_turns_but_keeps_itself() {
        let mut store = ContextStore::new(20);
        store.append(Role::User, "oooooooooo").unwrap();
        store.append(Role::Narrator, "n".repeat(15)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.turns()[0].role, Role::Narrator);
    }

    #[test]
    fn remove_last_matches_role_only() {
        let mut store = ContextStore::new(1_000);
        store.append(Role::Narrator, "one").unwrap();
        store.append(Role::User, "two").unwrap();
        store.append(Role::Narrator, "three").unwrap();

        assert!(store.remove_last(Role::Narrator));
        assert_eq!(store.len(), 2);
        assert!(store.turns().iter().any(|t| t.text == "one"));
        assert!(!store.turns().iter().any(|t| t.text == "three"));
    }

    #[test]
    fn remove_last_is_noop_without_match() {
        let mut store = ContextStore::new(1_000);
        store.append(Role::User, "only user turns").unwrap();
        assert!(!store.remove_last(Role::Narrator));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn replace_resets_indexing() {
        let mut store = ContextStore::new(1_000);
        store.append(Role::User, "old").unwrap();

        store.replace(vec![
            Turn::new(Role::System, "setup", 0),
            Turn::new(Role::User, "restored", 1),
        ]);
        store.append(Role::Narrator, "fresh").unwrap();
        assert_eq!(store.turns().last().unwrap().sequence_index, 2);
    }

    #[test]
    fn prompt_context_folds_pinned_into_system() {
        let mut store = ContextStore::new(1_000);
        store.append(Role::System, "You are the Dungeon Master.").unwrap();
        store.append(Role::User, "look").unwrap();

        let prompt = store.prompt_context(ContentPolicy::Open);
        assert_eq!(prompt.system, "You are the Dungeon Master.");
        assert_eq!(prompt.turns.len(), 1);
        assert_eq!(prompt.turns[0].text, "look");
    }

    #[test]
    fn unicode_counted_by_codepoints() {
        let mut store = ContextStore::new(4);
        store.append(Role::User, "你好你好").unwrap();
        assert_eq!(store.used_chars(), 4);
    }
}
