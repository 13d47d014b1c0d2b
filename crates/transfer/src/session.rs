use std::sync::RwLock;

use vidlift_protocol::{UploadProgress, UploadStatus};

/// Tracks one upload session (thread-safe handle).
///
/// Created by the driver when transmission starts; mutated only as
/// chunks are acknowledged. Terminal states are sticky: once
/// completed, errored or cancelled, nothing moves.
pub struct UploadSession {
    inner: RwLock<SessionInner>,
}

struct SessionInner {
    upload_id: String,
    file_name: String,
    total_size: u64,
    chunk_size: u64,
    total_chunks: u32,
    uploaded_chunks: u32,
    status: UploadStatus,
    error: String,
    file_path: String,
}

impl UploadSession {
    /// Creates a session in the `uploading` state with a fresh
    /// coordinator-generated upload id.
    pub fn new(file_name: String, total_size: u64, chunk_size: u64, total_chunks: u32) -> Self {
        Self {
            inner: RwLock::new(SessionInner {
                upload_id: uuid::Uuid::new_v4().to_string(),
                file_name,
                total_size,
                chunk_size,
                total_chunks,
                uploaded_chunks: 0,
                status: UploadStatus::Uploading,
                error: String::new(),
                file_path: String::new(),
            }),
        }
    }

    /// Records one acknowledged chunk.
    ///
    /// Monotonic: only counts while `uploading`, capped at
    /// `total_chunks`.
    pub fn record_chunk(&self) {
        let mut s = self.inner.write().unwrap();
        if s.status == UploadStatus::Uploading && s.uploaded_chunks < s.total_chunks {
            s.uploaded_chunks += 1;
        }
    }

    /// Marks the session completed with the receiver-assigned path.
    pub fn complete(&self, file_path: &str) {
        let mut s = self.inner.write().unwrap();
        if s.status == UploadStatus::Uploading {
            s.status = UploadStatus::Completed;
            s.file_path = file_path.to_string();
        }
    }

    /// Marks the session failed with a human-readable reason.
    pub fn fail(&self, error: &str) {
        let mut s = self.inner.write().unwrap();
        if s.status == UploadStatus::Uploading {
            s.status = UploadStatus::Error;
            s.error = error.to_string();
        }
    }

    /// Marks the session cancelled. No-op on a terminal session.
    pub fn cancel(&self) {
        let mut s = self.inner.write().unwrap();
        if s.status == UploadStatus::Uploading {
            s.status = UploadStatus::Cancelled;
        }
    }

    /// Snapshots the observable progress.
    pub fn progress(&self) -> UploadProgress {
        let s = self.inner.read().unwrap();
        UploadProgress {
            upload_id: s.upload_id.clone(),
            status: s.status,
            total_chunks: s.total_chunks,
            uploaded_chunks: s.uploaded_chunks,
            error: s.error.clone(),
            file_path: s.file_path.clone(),
        }
    }

    /// Returns the coordinator-generated upload id.
    pub fn upload_id(&self) -> String {
        self.inner.read().unwrap().upload_id.clone()
    }

    /// Original client-side file name (advisory only).
    pub fn file_name(&self) -> String {
        self.inner.read().unwrap().file_name.clone()
    }

    /// Total byte length of the source file.
    pub fn total_size(&self) -> u64 {
        self.inner.read().unwrap().total_size
    }

    /// Configured maximum bytes per chunk.
    pub fn chunk_size(&self) -> u64 {
        self.inner.read().unwrap().chunk_size
    }

    /// Current status.
    pub fn status(&self) -> UploadStatus {
        self.inner.read().unwrap().status
    }

    /// Count of acknowledged chunks.
    pub fn uploaded_chunks(&self) -> u32 {
        self.inner.read().unwrap().uploaded_chunks
    }
}
