use fable_core::errors::BackendError;
use fable_store::StoreError;

/// Errors surfaced by the session loop. Most are reported to the player and
/// leave the session running; fatal ones terminate it.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown command: /{0}")]
    UnknownCommand(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Pinned content alone exceeds the context budget; nothing can be
    /// evicted to make room.
    #[error("context budget exceeded: {used} chars with budget {budget}")]
    CapacityExceeded { used: usize, budget: usize },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("generation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Fatal errors terminate the session loop; everything else is reported
    /// and the loop keeps running.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. } | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_capacity_and_internal_are_fatal() {
        assert!(EngineError::CapacityExceeded { used: 20, budget: 10 }.is_fatal());
        assert!(EngineError::Internal("bad state".into()).is_fatal());
        assert!(!EngineError::UnknownCommand("bogus".into()).is_fatal());
        assert!(!EngineError::Cancelled.is_fatal());
        assert!(!EngineError::Backend(BackendError::Cancelled).is_fatal());
    }
}
