use crate::errors::BackendError;

/// Events emitted while a narration response streams in. Ordering contract:
///
/// Start → Delta* → Done | Error
///
/// The sequence is finite and non-restartable; the session loop concatenates
/// deltas and commits a single turn only after Done.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Start,
    Delta { text: String },
    /// Terminal success. Carries the full accumulated text so consumers do not
    /// have to rely on their own delta bookkeeping.
    Done { text: String },
    Error { error: BackendError },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
