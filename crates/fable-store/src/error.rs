use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file existed but contained no usable turn at all.
    #[error("no usable session data in {0}")]
    CorruptSession(PathBuf),
}
