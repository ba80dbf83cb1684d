use std::time::Duration;

/// Typed error hierarchy for narration backend operations.
/// Classifies errors as fatal (don't retry), retryable, or operational.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    // Fatal — don't retry
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // Retryable
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    // Operational
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_)
                | Self::ServerError { .. }
                | Self::Network(_)
                | Self::StreamInterrupted(_)
                | Self::Timeout(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ModelNotFound(_) | Self::InvalidRequest(_))
    }

    /// Short classification string for logging and user-facing reports.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::ModelNotFound(_) => "model_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Unavailable(_) => "unavailable",
            Self::ServerError { .. } => "server_error",
            Self::Network(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    /// 404 from either backend means the requested model is not loaded.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => Self::ModelNotFound(body),
            400 => Self::InvalidRequest(body),
            503 => Self::Unavailable(body),
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(BackendError::Unavailable("refused".into()).is_retryable());
        assert!(BackendError::ServerError { status: 500, body: "err".into() }.is_retryable());
        assert!(BackendError::Network("tcp".into()).is_retryable());
        assert!(BackendError::StreamInterrupted("eof".into()).is_retryable());
        assert!(BackendError::Timeout(Duration::from_secs(180)).is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(BackendError::ModelNotFound("qwen3-vl:4b".into()).is_fatal());
        assert!(BackendError::InvalidRequest("bad".into()).is_fatal());
        assert!(!BackendError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(!BackendError::Cancelled.is_fatal());
    }

    #[test]
    fn cancelled_is_neither_retryable_nor_fatal() {
        let cancelled = BackendError::Cancelled;
        assert!(!cancelled.is_retryable());
        assert!(!cancelled.is_fatal());
    }

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            BackendError::from_status(404, "model 'x' not found".into()),
            BackendError::ModelNotFound(_)
        ));
        assert!(BackendError::from_status(400, "bad request".into()).is_fatal());
        assert!(BackendError::from_status(503, "loading".into()).is_retryable());
        assert!(BackendError::from_status(500, "internal".into()).is_retryable());
        assert!(BackendError::from_status(502, "bad gateway".into()).is_retryable());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(BackendError::Cancelled.error_kind(), "cancelled");
        assert_eq!(
            BackendError::ModelNotFound("m".into()).error_kind(),
            "model_not_found"
        );
        assert_eq!(
            BackendError::Timeout(Duration::from_secs(1)).error_kind(),
            "timeout"
        );
    }
}
