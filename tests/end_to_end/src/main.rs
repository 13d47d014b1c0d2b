fn main() {
    println!("Run `cargo test -p end-to-end` to execute the client/server upload tests.");
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::path::PathBuf;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use vidlift_protocol::{
        ApiResponse, CancelRequest, ChunkAck, ChunkMetadata, UploadKind, UploadStatus,
    };
    use vidlift_receiver::ChunkReceiver;
    use vidlift_transfer::{
        ChunkTransport, SelectedFile, UploadConstraints, UploadError, UploadEvent, Uploader,
    };

    /// In-process transport wiring the uploader directly to a
    /// receiver, standing in for the HTTP hop.
    ///
    /// Receiver-side rejections surface as `success=false` envelopes,
    /// exactly as the HTTP layer would report them.
    struct LoopbackTransport {
        receiver: Arc<ChunkReceiver>,
        /// Trip this token right after the numbered chunk is
        /// acknowledged.
        cancel_after: Option<(u32, CancellationToken)>,
        /// Fail this chunk with a transport error instead of
        /// delivering it.
        fail_at: Option<u32>,
        /// Signalled once a cancel request has been processed.
        cancel_done_tx: Mutex<Option<tokio::sync::oneshot::Sender<String>>>,
        delivered: AtomicU32,
    }

    impl LoopbackTransport {
        fn new(receiver: Arc<ChunkReceiver>) -> Self {
            Self {
                receiver,
                cancel_after: None,
                fail_at: None,
                cancel_done_tx: Mutex::new(None),
                delivered: AtomicU32::new(0),
            }
        }

        fn watch_cancel(&self) -> tokio::sync::oneshot::Receiver<String> {
            let (tx, rx) = tokio::sync::oneshot::channel();
            *self.cancel_done_tx.lock().unwrap() = Some(tx);
            rx
        }
    }

    impl ChunkTransport for LoopbackTransport {
        fn send_chunk(
            &self,
            kind: UploadKind,
            metadata: &ChunkMetadata,
            payload: &[u8],
        ) -> Pin<Box<dyn Future<Output = Result<ApiResponse<ChunkAck>, UploadError>> + Send + '_>>
        {
            let metadata = metadata.clone();
            let payload = payload.to_vec();
            Box::pin(async move {
                if self.fail_at == Some(metadata.chunk_number) {
                    return Err(UploadError::Transport("connection reset".into()));
                }
                let response = match self.receiver.receive_chunk(kind, &metadata, &payload).await {
                    Ok(ack) => ApiResponse::success(ack),
                    Err(e) => ApiResponse::error(e.to_string()),
                };
                self.delivered.fetch_add(1, Ordering::SeqCst);
                if let Some((after, token)) = &self.cancel_after
                    && metadata.chunk_number == *after
                {
                    token.cancel();
                }
                Ok(response)
            })
        }

        fn cancel_upload(
            &self,
            request: &CancelRequest,
        ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>> {
            let id = request.upload_id.clone();
            Box::pin(async move {
                self.receiver
                    .cancel_upload(&id)
                    .await
                    .map_err(|e| UploadError::Transport(e.to_string()))?;
                if let Some(tx) = self.cancel_done_tx.lock().unwrap().take() {
                    let _ = tx.send(id);
                }
                Ok(())
            })
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn write_source(dir: &TempDir, name: &str, len: usize) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, pattern(len)).unwrap();
        path
    }

    fn select_video(dir: &TempDir, len: usize, chunk_size: u64) -> SelectedFile {
        let path = write_source(dir, "clip.mp4", len);
        let constraints = UploadConstraints {
            max_file_size: UploadKind::Video.max_file_size(),
            accepted_types: "video/*".into(),
            chunk_size,
        };
        constraints.select_file(&path, "video/mp4").unwrap()
    }

    fn temp_entries_for(root: &TempDir, upload_id: &str) -> usize {
        let temp = root.path().join("temp");
        match std::fs::read_dir(temp) {
            Ok(entries) => entries
                .flatten()
                .filter(|e| {
                    e.file_name()
                        .to_str()
                        .is_some_and(|n| n.starts_with(upload_id))
                })
                .count(),
            Err(_) => 0,
        }
    }

    #[tokio::test]
    async fn full_upload_reassembles_identical_bytes() {
        let source_dir = TempDir::new().unwrap();
        let server_dir = TempDir::new().unwrap();
        let selected = select_video(&source_dir, 100, 10);

        let receiver = Arc::new(ChunkReceiver::new(server_dir.path()));
        let transport = Arc::new(LoopbackTransport::new(Arc::clone(&receiver)));
        let mut uploader = Uploader::new(UploadKind::Video, Arc::clone(&transport) as _);
        let mut events = uploader.take_events().unwrap();

        let outcome = uploader.upload(&selected).await.unwrap();
        assert!(outcome.file_path.starts_with("videos/"));
        assert!(outcome.file_path.ends_with(".mp4"));
        assert_eq!(
            format!("videos/{}", outcome.file_name),
            outcome.file_path
        );

        // Artifact bytes match the source exactly.
        let artifact = std::fs::read(server_dir.path().join(&outcome.file_path)).unwrap();
        assert_eq!(artifact, pattern(100));

        // Temp state fully reclaimed on completion.
        assert_eq!(temp_entries_for(&server_dir, &outcome.upload_id), 0);

        // Progress events are monotonic and end in Completed.
        drop(uploader);
        let mut last_percent = 0;
        let mut terminal = None;
        while let Some(e) = events.recv().await {
            match e {
                UploadEvent::Progress(p) => {
                    assert!(p.percent() >= last_percent);
                    last_percent = p.percent();
                }
                other => terminal = Some(other),
            }
        }
        assert_eq!(last_percent, 100);
        assert!(matches!(terminal, Some(UploadEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn short_last_chunk_roundtrip() {
        let source_dir = TempDir::new().unwrap();
        let server_dir = TempDir::new().unwrap();
        let selected = select_video(&source_dir, 95, 10);

        let receiver = Arc::new(ChunkReceiver::new(server_dir.path()));
        let transport = Arc::new(LoopbackTransport::new(receiver));
        let uploader = Uploader::new(UploadKind::Video, transport as _);

        let outcome = uploader.upload(&selected).await.unwrap();
        let artifact = std::fs::read(server_dir.path().join(&outcome.file_path)).unwrap();
        assert_eq!(artifact, pattern(95));
    }

    #[tokio::test]
    async fn cancel_mid_upload_discards_server_state() {
        let source_dir = TempDir::new().unwrap();
        let server_dir = TempDir::new().unwrap();
        let selected = select_video(&source_dir, 100, 10);

        let receiver = Arc::new(ChunkReceiver::new(server_dir.path()));
        let mut transport = LoopbackTransport::new(Arc::clone(&receiver));
        let token = CancellationToken::new();
        transport.cancel_after = Some((3, token.clone()));
        let transport = Arc::new(transport);
        let cancel_done = transport.watch_cancel();

        let uploader = Uploader::new(UploadKind::Video, Arc::clone(&transport) as _);
        let forward = tokio::spawn({
            let driver_token = uploader.cancel_token();
            let t = token.clone();
            async move {
                t.cancelled().await;
                driver_token.cancel();
            }
        });

        let err = uploader.upload(&selected).await.unwrap_err();
        assert!(err.is_cancelled());
        forward.await.unwrap();

        let progress = uploader.progress().unwrap();
        assert_eq!(progress.status, UploadStatus::Cancelled);
        assert_eq!(progress.uploaded_chunks, 3);

        // The cleanup call removed the three persisted chunks.
        let cancelled_id = tokio::time::timeout(Duration::from_secs(5), cancel_done)
            .await
            .expect("cleanup call never reached the receiver")
            .unwrap();
        assert_eq!(cancelled_id, progress.upload_id);
        assert_eq!(temp_entries_for(&server_dir, &cancelled_id), 0);
        assert!(!server_dir.path().join("videos").exists());
    }

    #[tokio::test]
    async fn transport_failure_leaves_partial_state_for_expiry() {
        let source_dir = TempDir::new().unwrap();
        let server_dir = TempDir::new().unwrap();
        let selected = select_video(&source_dir, 100, 10);

        let receiver = Arc::new(ChunkReceiver::new(server_dir.path()));
        let mut transport = LoopbackTransport::new(Arc::clone(&receiver));
        transport.fail_at = Some(5);
        let transport = Arc::new(transport);

        let uploader = Uploader::new(UploadKind::Video, Arc::clone(&transport) as _);
        let err = uploader.upload(&selected).await.unwrap_err();
        assert!(matches!(err, UploadError::Transport(_)));
        assert_eq!(uploader.progress().unwrap().status, UploadStatus::Error);

        // Chunks 1-4 and the session info remain on disk, no artifact.
        let upload_id = uploader.progress().unwrap().upload_id;
        assert_eq!(temp_entries_for(&server_dir, &upload_id), 5);
        assert!(!server_dir.path().join("videos").exists());

        // The receiver can report what it holds for the session.
        let report = receiver.upload_status(&upload_id).unwrap().unwrap();
        assert_eq!(report.uploaded_chunks, vec![1, 2, 3, 4]);
        assert!(!report.completed);

        // The abandoned session is reclaimed by age-based cleanup.
        assert_eq!(receiver.cleanup_expired(Duration::ZERO).unwrap(), 5);
        assert_eq!(temp_entries_for(&server_dir, &upload_id), 0);
    }

    #[tokio::test]
    async fn receiver_rejection_fails_the_upload() {
        let source_dir = TempDir::new().unwrap();
        let server_dir = TempDir::new().unwrap();

        // Client-side constraints looser than the receiver's limits:
        // a 6 MiB thumbnail passes selection but the receiver caps
        // thumbnails at 5 MiB.
        let path = write_source(&source_dir, "poster.jpg", 6 * 1024 * 1024);
        let constraints = UploadConstraints {
            max_file_size: 10 * 1024 * 1024,
            accepted_types: "image/*".into(),
            chunk_size: 1024 * 1024,
        };
        let selected = constraints.select_file(&path, "image/jpeg").unwrap();

        let receiver = Arc::new(ChunkReceiver::new(server_dir.path()));
        let transport = Arc::new(LoopbackTransport::new(receiver));
        let uploader = Uploader::new(UploadKind::Thumbnail, Arc::clone(&transport) as _);

        let err = uploader.upload(&selected).await.unwrap_err();
        match err {
            UploadError::Rejected(reason) => assert!(reason.contains("too large")),
            other => panic!("expected Rejected, got {other:?}"),
        }

        // Rejected on the first chunk, no further transmission.
        assert_eq!(transport.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(uploader.progress().unwrap().status, UploadStatus::Error);
        assert_eq!(uploader.progress().unwrap().uploaded_chunks, 0);
    }

    #[tokio::test]
    async fn duplicate_final_chunk_gets_same_path() {
        let source_dir = TempDir::new().unwrap();
        let server_dir = TempDir::new().unwrap();
        let selected = select_video(&source_dir, 100, 10);

        let receiver = Arc::new(ChunkReceiver::new(server_dir.path()));
        let transport = Arc::new(LoopbackTransport::new(Arc::clone(&receiver)));
        let uploader = Uploader::new(UploadKind::Video, transport as _);
        let outcome = uploader.upload(&selected).await.unwrap();

        // The client lost the final ack and resends the last chunk.
        let resend = ChunkMetadata {
            chunk_number: 10,
            total_chunks: 10,
            chunk_size: 10,
            total_size: 100,
            file_name: "clip.mp4".into(),
            upload_id: outcome.upload_id.clone(),
        };
        let ack = receiver
            .receive_chunk(UploadKind::Video, &resend, &pattern(100)[90..])
            .await
            .unwrap();
        assert!(ack.completed);
        assert_eq!(ack.file_path.as_deref(), Some(outcome.file_path.as_str()));

        // Still exactly one artifact.
        let count = std::fs::read_dir(server_dir.path().join("videos"))
            .unwrap()
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn kinds_land_in_their_own_namespaces() {
        let source_dir = TempDir::new().unwrap();
        let server_dir = TempDir::new().unwrap();
        let receiver = Arc::new(ChunkReceiver::new(server_dir.path()));

        let path = write_source(&source_dir, "image.png", 1000);
        let constraints = UploadConstraints {
            max_file_size: 2 * 1024 * 1024,
            accepted_types: "image/*".into(),
            chunk_size: 256,
        };
        let selected = constraints.select_file(&path, "image/png").unwrap();

        let mut paths = Vec::new();
        for kind in [UploadKind::Thumbnail, UploadKind::ChannelImage] {
            let transport = Arc::new(LoopbackTransport::new(Arc::clone(&receiver)));
            let uploader = Uploader::new(kind, transport as _);
            let outcome = uploader.upload(&selected).await.unwrap();
            assert!(
                outcome.file_path.starts_with(kind.namespace()),
                "unexpected path {} for kind {kind}",
                outcome.file_path
            );
            assert!(outcome.file_path.ends_with(".png"));
            paths.push(outcome.file_path);
        }

        for path in &paths {
            assert_eq!(
                std::fs::read(server_dir.path().join(path)).unwrap(),
                pattern(1000)
            );
        }
    }
}
