use crate::turn::{Role, Turn};

/// Content-policy directive derived from the session's censor flag.
/// Always present in the outbound request so a flag change is visible to the
/// backend on the very next call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentPolicy {
    /// Censoring on: narration stays family-friendly.
    Restricted,
    /// Censoring off: mature themes allowed where the story calls for them.
    Open,
}

impl ContentPolicy {
    pub fn from_censored(censored: bool) -> Self {
        if censored {
            Self::Restricted
        } else {
            Self::Open
        }
    }

    pub fn directive(&self) -> &'static str {
        match self {
            Self::Restricted => {
                "Content policy: keep all narration free of profanity, gore, and explicit content."
            }
            Self::Open => {
                "Content policy: mature themes are permitted where the story calls for them."
            }
        }
    }
}

/// The composed context sent to a backend: pinned system text first, then the
/// ordered transcript. Built fresh per request from a Context Store snapshot.
#[derive(Clone, Debug)]
pub struct PromptContext {
    pub system: String,
    pub turns: Vec<Turn>,
    pub policy: ContentPolicy,
}

impl PromptContext {
    /// Empty context (useful for testing).
    pub fn empty() -> Self {
        Self {
            system: String::new(),
            turns: Vec::new(),
            policy: ContentPolicy::Open,
        }
    }

    /// Full system block including the policy directive.
    pub fn system_block(&self) -> String {
        if self.system.is_empty() {
            self.policy.directive().to_string()
        } else {
            format!("{}\n\n{}", self.system, self.policy.directive())
        }
    }

    /// Flat completion-style rendering, used by the Ollama `/api/generate`
    /// endpoint. Ends with the narrator cue so the model continues the story.
    pub fn render_flat(&self) -> String {
        let mut out = self.system_block();
        out.push_str("\n\n");
        for turn in &self.turns {
            match turn.role {
                Role::User => {
                    out.push_str("Player: ");
                    out.push_str(&turn.text);
                    out.push('\n');
                }
                Role::Narrator => {
                    out.push_str("Dungeon Master: ");
                    out.push_str(&turn.text);
                    out.push('\n');
                }
                // System turns are already folded into the system block.
                Role::System => {}
            }
        }
        out.push_str("Dungeon Master:");
        out
    }

    /// Chat-style rendering for OpenAI-compatible endpoints:
    /// (api role name, content) pairs, system block first.
    pub fn chat_messages(&self) -> Vec<(&'static str, String)> {
        let mut messages = vec![("system", self.system_block())];
        for turn in &self.turns {
            if turn.role == Role::System {
                continue;
            }
            messages.push((turn.role.api_name(), turn.text.clone()));
        }
        messages
    }
}
