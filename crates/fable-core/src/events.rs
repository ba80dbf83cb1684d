use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Session lifecycle events emitted by the session loop over a broadcast
/// channel. The presentation layer renders them; nothing in the engine blocks
/// on delivery.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    #[serde(rename = "generation_start")]
    GenerationStart { session_id: SessionId, turn: u64 },

    #[serde(rename = "narration_delta")]
    NarrationDelta { session_id: SessionId, delta: String },

    #[serde(rename = "turn_complete")]
    TurnComplete {
        session_id: SessionId,
        turn: u64,
        chars: usize,
    },

    #[serde(rename = "generation_cancelled")]
    GenerationCancelled { session_id: SessionId },

    #[serde(rename = "censor_toggled")]
    CensorToggled {
        session_id: SessionId,
        censored: bool,
    },

    #[serde(rename = "model_changed")]
    ModelChanged { session_id: SessionId, model: String },

    #[serde(rename = "available_models")]
    AvailableModels {
        session_id: SessionId,
        models: Vec<String>,
    },

    #[serde(rename = "help_requested")]
    HelpRequested { session_id: SessionId },

    #[serde(rename = "status_report")]
    StatusReport {
        session_id: SessionId,
        model: String,
        censored: bool,
        turns: usize,
        chars: usize,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "saved")]
    Saved {
        session_id: SessionId,
        path: String,
        turns: usize,
    },

    #[serde(rename = "loaded")]
    Loaded {
        session_id: SessionId,
        path: String,
        turns: usize,
        skipped: usize,
    },

    #[serde(rename = "terminated")]
    Terminated {
        session_id: SessionId,
        reason: String,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::GenerationStart { session_id, .. }
            | Self::NarrationDelta { session_id, .. }
            | Self::TurnComplete { session_id, .. }
            | Self::GenerationCancelled { session_id }
            | Self::CensorToggled { session_id, .. }
            | Self::ModelChanged { session_id, .. }
            | Self::AvailableModels { session_id, .. }
            | Self::HelpRequested { session_id }
            | Self::StatusReport { session_id, .. }
            | Self::Saved { session_id, .. }
            | Self::Loaded { session_id, .. }
            | Self::Terminated { session_id, .. } => session_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::GenerationStart { .. } => "generation_start",
            Self::NarrationDelta { .. } => "narration_delta",
            Self::TurnComplete { .. } => "turn_complete",
            Self::GenerationCancelled { .. } => "generation_cancelled",
            Self::CensorToggled { .. } => "censor_toggled",
            Self::ModelChanged { .. } => "model_changed",
            Self::AvailableModels { .. } => "available_models",
            Self::HelpRequested { .. } => "help_requested",
            Self::StatusReport { .. } => "status_report",
            Self::Saved { .. } => "saved",
            Self::Loaded { .. } => "loaded",
            Self::Terminated { .. } => "terminated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_tags_match_event_type() {
        let id = SessionId::new();
        let events = vec![
            SessionEvent::GenerationStart { session_id: id.clone(), turn: 1 },
            SessionEvent::NarrationDelta { session_id: id.clone(), delta: "x".into() },
            SessionEvent::TurnComplete { session_id: id.clone(), turn: 1, chars: 1 },
            SessionEvent::Terminated { session_id: id.clone(), reason: "exit".into() },
        ];
        for event in &events {
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[test]
    fn session_id_accessor_covers_all_variants() {
        let id = SessionId::new();
        let event = SessionEvent::Saved {
            session_id: id.clone(),
            path: "saves/adventure.txt".into(),
            turns: 4,
        };
        assert_eq!(event.session_id(), &id);
    }
}
