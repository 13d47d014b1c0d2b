//! Wire protocol types for the vidlift chunked upload protocol.
//!
//! Shared by the upload coordinator (client role) and the chunk
//! receiver (server role). The wire shape follows the platform's REST
//! API: a multipart chunk payload with a JSON metadata sidecar, and
//! JSON response envelopes.

pub mod chunk;
pub mod envelope;
pub mod kind;
pub mod types;

// Re-export primary types for convenience.
pub use chunk::{CancelRequest, ChunkAck, ChunkMetadata, InvalidMetadata, UploadStatusReport};
pub use envelope::ApiResponse;
pub use kind::{UnknownUploadKind, UploadKind};
pub use types::{UploadProgress, UploadStatus};
