//! Upload coordinator: drives one file through the chunked-transfer
//! state machine.
//!
//! This crate implements the **client role** of the upload protocol.
//! It is a library crate with no transport dependency: callers
//! provide a [`ChunkTransport`] implementation that bridges to the
//! actual HTTP client.
//!
//! # Pipeline
//!
//! 1. **Select**: validate the file against caller constraints
//! 2. **Plan**: compute the chunk plan (`ceil(size / chunk_size)`)
//! 3. **Upload**: send chunks strictly in order, one in flight,
//!    suspending on each acknowledgment
//! 4. **Finish**: surface the receiver-assigned file path, or a
//!    typed failure; cancellation triggers a fire-and-forget cleanup
//!    call

pub mod constraints;
pub mod error;
pub mod plan;
pub mod session;
pub mod uploader;

// Re-export primary types for convenience.
pub use constraints::{SelectedFile, UploadConstraints};
pub use error::UploadError;
pub use plan::{ChunkPlan, ChunkReader, FileChunk};
pub use session::UploadSession;
pub use uploader::{ChunkTransport, UploadEvent, UploadOutcome, Uploader};

/// Default chunk size: 1 MiB.
///
/// Small enough to bound per-request memory, large enough that
/// per-chunk overhead stays negligible for video-sized files.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;
