//! Sequential upload driver with cancellation and progress events.
//!
//! `ChunkTransport` is implemented by the application to bridge the
//! driver to the actual HTTP client. Using a trait keeps the driver
//! decoupled from transport and testable with mocks.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vidlift_protocol::{
    ApiResponse, CancelRequest, ChunkAck, ChunkMetadata, UploadKind, UploadProgress,
};

use crate::constraints::SelectedFile;
use crate::error::UploadError;
use crate::plan::ChunkReader;
use crate::session::UploadSession;

/// Abstract transport for the chunk endpoint pair.
///
/// One implementation per application: HTTP in production, in-process
/// loopback or mock in tests.
pub trait ChunkTransport: Send + Sync {
    /// Sends one chunk (`POST /upload/{kind}/chunk` shaped) and waits
    /// for the acknowledgment.
    fn send_chunk(
        &self,
        kind: UploadKind,
        metadata: &ChunkMetadata,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse<ChunkAck>, UploadError>> + Send + '_>>;

    /// Asks the receiver to discard partial state for an upload
    /// (`DELETE /upload/cancel` shaped).
    fn cancel_upload(
        &self,
        request: &CancelRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>>;
}

/// Progress and terminal events for one upload session.
///
/// The stream is finite: exactly one of `Completed` / `Failed` /
/// `Cancelled` ends it.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Progress(UploadProgress),
    Completed { upload_id: String, file_path: String },
    Failed { upload_id: String, error: String },
    Cancelled { upload_id: String },
}

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub upload_id: String,
    /// Receiver-assigned path, `{namespace}/{generated}.{ext}`.
    pub file_path: String,
    /// Final path segment of `file_path`, the durable reference to
    /// store in application metadata.
    pub file_name: String,
}

/// Drives a single file through the chunked-transfer state machine.
///
/// Strictly sequential: one chunk in flight, the next not sent until
/// the previous acknowledgment arrives. No chunk is retried; retry
/// is a caller decision (start a wholly new session).
pub struct Uploader {
    transport: Arc<dyn ChunkTransport>,
    kind: UploadKind,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
    current: RwLock<Option<Arc<UploadSession>>>,
}

impl Uploader {
    /// Creates an uploader for one destination kind.
    pub fn new(kind: UploadKind, transport: Arc<dyn ChunkTransport>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            transport,
            kind,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
            current: RwLock::new(None),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns a cancellation token for this upload.
    ///
    /// Cancelling aborts the in-flight chunk request; the driver then
    /// issues one fire-and-forget cleanup call to the receiver.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshots the current session's progress, if one is running.
    pub fn progress(&self) -> Option<UploadProgress> {
        let current = self.current.read().unwrap();
        current.as_ref().map(|s| s.progress())
    }

    /// Uploads a selected file, suspending between chunks while
    /// awaiting each acknowledgment.
    ///
    /// Returns the receiver-assigned artifact path on success,
    /// [`UploadError::Cancelled`] on caller-initiated abort, and any
    /// other variant for a transmission failure. Exactly one terminal
    /// event is emitted.
    pub async fn upload(&self, selected: &SelectedFile) -> Result<UploadOutcome, UploadError> {
        let plan = selected.plan;
        let session = Arc::new(UploadSession::new(
            selected.file_name.clone(),
            plan.total_size(),
            plan.chunk_size(),
            plan.total_chunks(),
        ));
        *self.current.write().unwrap() = Some(Arc::clone(&session));

        let upload_id = session.upload_id();
        debug!(
            upload_id = %upload_id,
            kind = %self.kind,
            file = %selected.file_name,
            total_chunks = plan.total_chunks(),
            total_bytes = plan.total_size(),
            "starting upload"
        );

        match self.run(selected, &session).await {
            Ok(outcome) => {
                session.complete(&outcome.file_path);
                self.emit(UploadEvent::Progress(session.progress())).await;
                self.emit(UploadEvent::Completed {
                    upload_id: outcome.upload_id.clone(),
                    file_path: outcome.file_path.clone(),
                })
                .await;
                info!(upload_id = %upload_id, path = %outcome.file_path, "upload completed");
                Ok(outcome)
            }
            Err(UploadError::Cancelled) => {
                session.cancel();
                self.emit(UploadEvent::Cancelled {
                    upload_id: upload_id.clone(),
                })
                .await;
                self.spawn_cleanup(upload_id);
                Err(UploadError::Cancelled)
            }
            Err(e) => {
                let reason = e.to_string();
                session.fail(&reason);
                self.emit(UploadEvent::Failed {
                    upload_id: upload_id.clone(),
                    error: reason.clone(),
                })
                .await;
                warn!(upload_id = %upload_id, error = %reason, "upload failed");
                Err(e)
            }
        }
    }

    /// The sequential chunk loop. Does not touch terminal session
    /// state; `upload` owns the terminal transition.
    async fn run(
        &self,
        selected: &SelectedFile,
        session: &Arc<UploadSession>,
    ) -> Result<UploadOutcome, UploadError> {
        let plan = selected.plan;
        let upload_id = session.upload_id();

        let mut reader = tokio::task::spawn_blocking({
            let path = selected.path.clone();
            move || ChunkReader::new(&path, plan)
        })
        .await
        .map_err(|e| UploadError::Transport(format!("task join error: {e}")))??;

        loop {
            if self.cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let (returned, read) = tokio::task::spawn_blocking(move || {
                let chunk = reader.next_chunk();
                (reader, chunk)
            })
            .await
            .map_err(|e| UploadError::Transport(format!("task join error: {e}")))?;
            reader = returned;

            let Some(chunk) = read? else {
                // Ran out of chunks without a completion ack.
                return Err(UploadError::ProtocolViolation(
                    "receiver never reported completion".into(),
                ));
            };

            let metadata = ChunkMetadata {
                chunk_number: chunk.index + 1,
                total_chunks: plan.total_chunks(),
                chunk_size: chunk.data.len() as u64,
                total_size: plan.total_size(),
                file_name: selected.file_name.clone(),
                upload_id: upload_id.clone(),
            };

            // At most one chunk in flight; an in-flight request is
            // aborted by cancellation.
            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                r = self.transport.send_chunk(self.kind, &metadata, &chunk.data) => r?,
            };

            if !response.success {
                let reason = response
                    .message
                    .unwrap_or_else(|| "unspecified server rejection".into());
                return Err(UploadError::Rejected(reason));
            }
            let ack = response.data.ok_or_else(|| {
                UploadError::ProtocolViolation("successful response without ack data".into())
            })?;

            session.record_chunk();
            self.emit(UploadEvent::Progress(session.progress())).await;
            debug!(
                upload_id = %upload_id,
                chunk = metadata.chunk_number,
                total = metadata.total_chunks,
                "chunk acknowledged"
            );

            if ack.completed {
                let file_path = ack.file_path.ok_or_else(|| {
                    UploadError::ProtocolViolation("completed ack without file_path".into())
                })?;
                let file_name = file_path
                    .rsplit('/')
                    .next()
                    .unwrap_or(file_path.as_str())
                    .to_string();
                return Ok(UploadOutcome {
                    upload_id,
                    file_path,
                    file_name,
                });
            }
        }
    }

    /// Best-effort receiver cleanup after cancellation. Does not
    /// block the caller on the cleanup call's result.
    fn spawn_cleanup(&self, upload_id: String) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let request = CancelRequest {
                upload_id: upload_id.clone(),
            };
            match transport.cancel_upload(&request).await {
                Ok(()) => debug!(upload_id = %upload_id, "cancel cleanup sent"),
                Err(e) => warn!(upload_id = %upload_id, error = %e, "cancel cleanup failed"),
            }
        });
    }

    async fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.send(event).await;
    }
}
