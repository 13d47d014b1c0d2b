use serde::{Deserialize, Serialize};

/// Error returned when chunk metadata fails structural validation.
#[derive(Debug, thiserror::Error)]
#[error("invalid chunk metadata: {0}")]
pub struct InvalidMetadata(pub String);

/// JSON sidecar accompanying every chunk payload.
///
/// `chunk_number` is 1-based on the wire; the coordinator iterates
/// 0-based indices and adds 1 when building the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_number: u32,
    pub total_chunks: u32,
    pub chunk_size: u64,
    pub total_size: u64,
    pub file_name: String,
    pub upload_id: String,
}

impl ChunkMetadata {
    /// Zero-based position of this chunk in the sequence.
    pub fn index(&self) -> u32 {
        self.chunk_number - 1
    }

    /// Whether this is the final chunk of the session.
    pub fn is_last(&self) -> bool {
        self.chunk_number == self.total_chunks
    }

    /// Structural sanity checks, independent of any stored session state.
    pub fn validate(&self) -> Result<(), InvalidMetadata> {
        if self.upload_id.is_empty() {
            return Err(InvalidMetadata("empty upload_id".into()));
        }
        if self.total_chunks == 0 {
            return Err(InvalidMetadata("total_chunks must be nonzero".into()));
        }
        if self.chunk_number == 0 || self.chunk_number > self.total_chunks {
            return Err(InvalidMetadata(format!(
                "chunk_number {} out of range 1..={}",
                self.chunk_number, self.total_chunks
            )));
        }
        if self.total_size == 0 {
            return Err(InvalidMetadata("total_size must be nonzero".into()));
        }
        if self.chunk_size == 0 {
            return Err(InvalidMetadata("chunk_size must be nonzero".into()));
        }
        if self.chunk_size > self.total_size {
            return Err(InvalidMetadata(format!(
                "chunk_size {} exceeds total_size {}",
                self.chunk_size, self.total_size
            )));
        }
        Ok(())
    }
}

/// Acknowledgment for one received chunk.
///
/// `completed` is `true` only when the receiver has assembled the
/// final artifact; `file_path` is present exactly in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAck {
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

/// Body of the cancel call (`DELETE /upload/cancel` shaped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub upload_id: String,
}

/// Receiver-side view of a session (`GET /upload/status` shaped).
///
/// `uploaded_chunks` lists the 1-based chunk numbers present;
/// `file_path` is populated only for a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadStatusReport {
    pub upload_id: String,
    pub uploaded_chunks: Vec<u32>,
    pub total_chunks: u32,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}
