use serde::{Deserialize, Serialize};

/// Current state of an upload session.
///
/// `Completed`, `Error` and `Cancelled` are terminal: a new file
/// requires a new session with a new upload id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl UploadStatus {
    /// Returns `true` for the three terminal states.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Uploading)
    }
}

/// Observable progress snapshot of an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub upload_id: String,
    pub status: UploadStatus,
    pub total_chunks: u32,
    pub uploaded_chunks: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_path: String,
}

impl UploadProgress {
    /// Upload progress as a whole percentage (0-100).
    pub fn percent(&self) -> u8 {
        if self.total_chunks == 0 {
            return 0;
        }
        let pct = (self.uploaded_chunks as f64 / self.total_chunks as f64 * 100.0).round();
        pct as u8
    }
}
