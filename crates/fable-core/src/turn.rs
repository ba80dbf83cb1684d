use serde::{Deserialize, Serialize};

/// Who produced a transcript turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Player input.
    User,
    /// Generated story text (the "dungeon master").
    Narrator,
    /// Scenario setup injected at session start. Pinned — never evicted.
    System,
}

impl Role {
    /// Tag used in the persisted save format.
    pub fn tag(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Narrator => "narrator",
            Role::System => "system",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Role> {
        match tag {
            "user" => Some(Role::User),
            "narrator" => Some(Role::Narrator),
            "system" => Some(Role::System),
            _ => None,
        }
    }

    /// Role name for OpenAI-style chat APIs.
    pub fn api_name(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Narrator => "assistant",
            Role::System => "system",
        }
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self, Role::System)
    }
}

/// One unit of transcript content. Immutable once appended; ordering is
/// append-only and total within a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub sequence_index: u64,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>, sequence_index: u64) -> Self {
        Self {
            role,
            text: text.into(),
            sequence_index,
        }
    }

    /// Size of this turn as counted against the context budget.
    pub fn chars(&self) -> usize {
        self.text.chars().count()
    }
}
