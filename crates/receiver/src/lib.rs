//! Chunk receiver: accepts chunks keyed by upload id and chunk
//! number, persists them to a temp directory, and assembles the final
//! artifact exactly once when every chunk is present.
//!
//! This crate implements the **server role** of the upload protocol.
//! It is transport-agnostic: an HTTP layer parses the multipart
//! request and calls [`ChunkReceiver::receive_chunk`] /
//! [`ChunkReceiver::cancel_upload`] /
//! [`ChunkReceiver::upload_status`].

pub mod receiver;
pub mod store;
pub mod validation;

// Re-export primary types for convenience.
pub use receiver::ChunkReceiver;
pub use store::ChunkStore;
pub use validation::{safe_extension, validate_file_name, validate_upload_id};

/// Errors produced by the chunk receiver. All validation failures are
/// fail-closed: nothing is assembled from a rejected session.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid chunk metadata: {0}")]
    InvalidMetadata(String),

    #[error("invalid upload id: {0}")]
    InvalidUploadId(String),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("chunk too large: {size} bytes (max {max})")]
    ChunkTooLarge { size: u64, max: u64 },

    #[error("file too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("metadata conflicts with session state: {0}")]
    SessionMismatch(String),
}

impl From<vidlift_protocol::InvalidMetadata> for ReceiverError {
    fn from(e: vidlift_protocol::InvalidMetadata) -> Self {
        Self::InvalidMetadata(e.0)
    }
}
