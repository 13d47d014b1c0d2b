//! Per-upload chunk intake, consistency validation and completion
//! detection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use vidlift_protocol::{ChunkAck, ChunkMetadata, UploadKind, UploadStatusReport};

use crate::store::ChunkStore;
use crate::validation::{safe_extension, validate_file_name, validate_upload_id};
use crate::ReceiverError;

/// Accepts chunks for upload sessions and assembles each artifact
/// exactly once.
///
/// Sessions are scoped by upload id, so concurrent sessions never
/// contend. Within one id, persistence and the completion check run
/// under a per-id async mutex: a retried request cannot race the
/// "last chunk written" / "assembly triggered" window.
pub struct ChunkReceiver {
    root: PathBuf,
    store: ChunkStore,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Assembled sessions keyed by upload id. Resubmitted chunks for
    /// these ids get an idempotent ack; entries expire with
    /// [`ChunkReceiver::cleanup_expired`].
    completed: RwLock<HashMap<String, CompletedUpload>>,
}

struct CompletedUpload {
    file_path: String,
    total_chunks: u32,
    at: Instant,
}

impl ChunkReceiver {
    /// Creates a receiver storing artifacts under `root` and partial
    /// chunks under `<root>/temp`.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            store: ChunkStore::new(root),
            locks: Mutex::new(HashMap::new()),
            completed: RwLock::new(HashMap::new()),
        }
    }

    /// Accepts one chunk; returns `completed=true` with the assigned
    /// `file_path` once every chunk of the session is present.
    ///
    /// A chunk for an already-completed id is answered idempotently
    /// with the original path; the artifact is never reassembled.
    pub async fn receive_chunk(
        &self,
        kind: UploadKind,
        metadata: &ChunkMetadata,
        payload: &[u8],
    ) -> Result<ChunkAck, ReceiverError> {
        metadata.validate()?;
        validate_upload_id(&metadata.upload_id)?;
        validate_file_name(&metadata.file_name)?;

        if payload.len() as u64 != metadata.chunk_size {
            return Err(ReceiverError::InvalidMetadata(format!(
                "payload is {} bytes but metadata declares {}",
                payload.len(),
                metadata.chunk_size
            )));
        }
        if metadata.chunk_size > kind.max_chunk_size() {
            return Err(ReceiverError::ChunkTooLarge {
                size: metadata.chunk_size,
                max: kind.max_chunk_size(),
            });
        }
        if metadata.total_size > kind.max_file_size() {
            return Err(ReceiverError::FileTooLarge {
                size: metadata.total_size,
                max: kind.max_file_size(),
            });
        }
        check_plan_shape(metadata)?;

        if let Some(ack) = self.completed_ack(&metadata.upload_id) {
            return Ok(ack);
        }

        let lock = self.session_lock(&metadata.upload_id);
        let _guard = lock.lock().await;

        // The completion may have raced us to the lock.
        if let Some(ack) = self.completed_ack(&metadata.upload_id) {
            return Ok(ack);
        }

        match self.store.load_info(&metadata.upload_id)? {
            None => self.store.save_info(metadata)?,
            Some(info) => check_consistency(&info, metadata)?,
        }

        self.store
            .write_chunk(&metadata.upload_id, metadata.chunk_number, payload)?;
        debug!(
            upload_id = %metadata.upload_id,
            chunk = metadata.chunk_number,
            total = metadata.total_chunks,
            "chunk stored"
        );

        let uploaded = self.store.uploaded_chunks(&metadata.upload_id);
        let all_present = uploaded.len() == metadata.total_chunks as usize
            && uploaded
                .iter()
                .zip(1..=metadata.total_chunks)
                .all(|(&have, want)| have == want);
        if !all_present {
            return Ok(ChunkAck {
                completed: false,
                file_path: None,
            });
        }

        let ext = safe_extension(&metadata.file_name, kind.default_extension());
        let generated = format!("{}.{ext}", uuid::Uuid::new_v4());
        let final_path = self.root.join(kind.namespace()).join(&generated);
        self.store.assemble(metadata, &final_path)?;

        let file_path = format!("{}/{generated}", kind.namespace());
        self.completed.write().unwrap().insert(
            metadata.upload_id.clone(),
            CompletedUpload {
                file_path: file_path.clone(),
                total_chunks: metadata.total_chunks,
                at: Instant::now(),
            },
        );
        self.locks.lock().unwrap().remove(&metadata.upload_id);
        info!(
            upload_id = %metadata.upload_id,
            path = %file_path,
            bytes = metadata.total_size,
            "upload assembled"
        );

        Ok(ChunkAck {
            completed: true,
            file_path: Some(file_path),
        })
    }

    /// Discards partial state for an upload id.
    ///
    /// Idempotent: unknown ids and already-completed ids are no-ops;
    /// an assembled artifact is never touched.
    pub async fn cancel_upload(&self, upload_id: &str) -> Result<(), ReceiverError> {
        if validate_upload_id(upload_id).is_err() {
            // Nothing can exist under an invalid id.
            return Ok(());
        }
        if self.completed.read().unwrap().contains_key(upload_id) {
            return Ok(());
        }

        {
            let lock = self.session_lock(upload_id);
            let _guard = lock.lock().await;
            self.store.remove_session(upload_id)?;
            debug!(upload_id = %upload_id, "upload cancelled, temp state discarded");
        }
        self.release_session_lock(upload_id);
        Ok(())
    }

    /// Reports what the receiver holds for an upload id: the chunk
    /// numbers received so far, or the artifact path for a completed
    /// session. `None` for an unknown id.
    pub fn upload_status(
        &self,
        upload_id: &str,
    ) -> Result<Option<UploadStatusReport>, ReceiverError> {
        validate_upload_id(upload_id)?;

        if let Some(done) = self.completed.read().unwrap().get(upload_id) {
            return Ok(Some(UploadStatusReport {
                upload_id: upload_id.to_string(),
                uploaded_chunks: (1..=done.total_chunks).collect(),
                total_chunks: done.total_chunks,
                completed: true,
                file_path: Some(done.file_path.clone()),
            }));
        }

        let Some(info) = self.store.load_info(upload_id)? else {
            return Ok(None);
        };
        Ok(Some(UploadStatusReport {
            upload_id: upload_id.to_string(),
            uploaded_chunks: self.store.uploaded_chunks(upload_id),
            total_chunks: info.total_chunks,
            completed: false,
            file_path: None,
        }))
    }

    /// Removes temp files older than `max_age` (abandoned sessions)
    /// and the in-memory tracking that goes with them, including
    /// completed-session entries past the same age.
    pub fn cleanup_expired(&self, max_age: Duration) -> Result<usize, ReceiverError> {
        let (removed, expired_ids) = self.store.cleanup_expired(max_age)?;
        for id in &expired_ids {
            self.release_session_lock(id);
        }
        self.completed
            .write()
            .unwrap()
            .retain(|_, done| done.at.elapsed() < max_age);
        Ok(removed)
    }

    fn completed_ack(&self, upload_id: &str) -> Option<ChunkAck> {
        let completed = self.completed.read().unwrap();
        completed.get(upload_id).map(|done| ChunkAck {
            completed: true,
            file_path: Some(done.file_path.clone()),
        })
    }

    fn session_lock(&self, upload_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        Arc::clone(locks.entry(upload_id.to_string()).or_default())
    }

    /// Drops the lock entry for an id unless another task still holds
    /// a handle to it (that task's session stays serialized).
    fn release_session_lock(&self, upload_id: &str) {
        let mut locks = self.locks.lock().unwrap();
        if let Some(entry) = locks.get(upload_id)
            && Arc::strong_count(entry) == 1
        {
            locks.remove(upload_id);
        }
    }
}

/// Validates the declared chunk length against the session's chunk
/// plan shape.
///
/// Non-last chunks pin the full chunk size: `ceil(total_size /
/// chunk_size)` must reproduce `total_chunks`. A lone chunk must be
/// the whole file.
fn check_plan_shape(metadata: &ChunkMetadata) -> Result<(), ReceiverError> {
    if metadata.total_chunks == 1 {
        if metadata.chunk_size != metadata.total_size {
            return Err(ReceiverError::InvalidMetadata(format!(
                "single chunk of {} bytes does not cover total_size {}",
                metadata.chunk_size, metadata.total_size
            )));
        }
        return Ok(());
    }
    if !metadata.is_last()
        && metadata.total_size.div_ceil(metadata.chunk_size) != metadata.total_chunks as u64
    {
        return Err(ReceiverError::InvalidMetadata(format!(
            "chunk_size {} inconsistent with total_size {} over {} chunks",
            metadata.chunk_size, metadata.total_size, metadata.total_chunks
        )));
    }
    Ok(())
}

/// Rejects metadata that conflicts with the session info recorded
/// from the first accepted chunk. Fail-closed: a mismatched session
/// is never assembled.
fn check_consistency(info: &ChunkMetadata, metadata: &ChunkMetadata) -> Result<(), ReceiverError> {
    if info.total_chunks != metadata.total_chunks {
        return Err(ReceiverError::SessionMismatch(format!(
            "total_chunks changed from {} to {}",
            info.total_chunks, metadata.total_chunks
        )));
    }
    if info.total_size != metadata.total_size {
        return Err(ReceiverError::SessionMismatch(format!(
            "total_size changed from {} to {}",
            info.total_size, metadata.total_size
        )));
    }
    if info.file_name != metadata.file_name {
        return Err(ReceiverError::SessionMismatch(format!(
            "file_name changed from {:?} to {:?}",
            info.file_name, metadata.file_name
        )));
    }

    // Chunk length discipline: all full chunks are equal-sized, the
    // last chunk is exactly the remainder.
    let expected = match (info.is_last(), metadata.is_last()) {
        (false, false) | (true, true) => Some(info.chunk_size),
        (false, true) => {
            Some(metadata.total_size - info.chunk_size * (metadata.total_chunks as u64 - 1))
        }
        (true, false) => None, // validated against the plan shape already
    };
    if let Some(expected) = expected
        && metadata.chunk_size != expected
    {
        return Err(ReceiverError::SessionMismatch(format!(
            "chunk_size {} where {} was expected",
            metadata.chunk_size, expected
        )));
    }
    if info.is_last() && !metadata.is_last() {
        // First-seen chunk was the last one; its length must be the
        // remainder of the plan this chunk declares.
        let remainder =
            metadata.total_size - metadata.chunk_size * (metadata.total_chunks as u64 - 1);
        if info.chunk_size != remainder {
            return Err(ReceiverError::SessionMismatch(format!(
                "last chunk was {} bytes but the plan leaves a remainder of {remainder}",
                info.chunk_size
            )));
        }
    }
    Ok(())
}
