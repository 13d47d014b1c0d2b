//! Coordinator error types.

/// Errors produced by the upload coordinator.
///
/// `Cancelled` is a distinguished outcome, not a transmission
/// failure: callers should not present it as an error.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("empty file")]
    EmptyFile,

    #[error("unaccepted content type: {0}")]
    UnacceptedType(String),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("too many chunks: {0}")]
    TooManyChunks(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server rejected chunk: {0}")]
    Rejected(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("cancelled")]
    Cancelled,
}

impl UploadError {
    /// Returns `true` for caller-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
