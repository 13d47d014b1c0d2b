use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::debug;
use vidlift_protocol::ChunkMetadata;

use crate::ReceiverError;

/// Temp-directory persistence for in-flight upload sessions.
///
/// Layout under `<temp_dir>`:
/// - `{upload_id}_chunk_{n}`: one file per received chunk (1-based)
/// - `{upload_id}_info.json`: metadata of the first accepted chunk,
///   used for consistency checks on later chunks
pub struct ChunkStore {
    temp_dir: PathBuf,
}

impl ChunkStore {
    /// Creates a store rooted at `<root>/temp`.
    pub fn new(root: &Path) -> Self {
        Self {
            temp_dir: root.join("temp"),
        }
    }

    fn chunk_path(&self, upload_id: &str, chunk_number: u32) -> PathBuf {
        self.temp_dir
            .join(format!("{upload_id}_chunk_{chunk_number}"))
    }

    fn info_path(&self, upload_id: &str) -> PathBuf {
        self.temp_dir.join(format!("{upload_id}_info.json"))
    }

    /// Persists the session info (first accepted chunk metadata).
    pub fn save_info(&self, info: &ChunkMetadata) -> Result<(), ReceiverError> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let json = serde_json::to_string(info)?;
        std::fs::write(self.info_path(&info.upload_id), json)?;
        Ok(())
    }

    /// Loads the session info, `None` for an unknown id.
    pub fn load_info(&self, upload_id: &str) -> Result<Option<ChunkMetadata>, ReceiverError> {
        let path = self.info_path(upload_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Writes one chunk payload. Overwriting an existing chunk file
    /// is allowed (a retried request replaces identical bytes).
    pub fn write_chunk(
        &self,
        upload_id: &str,
        chunk_number: u32,
        payload: &[u8],
    ) -> Result<(), ReceiverError> {
        std::fs::create_dir_all(&self.temp_dir)?;
        std::fs::write(self.chunk_path(upload_id, chunk_number), payload)?;
        Ok(())
    }

    /// Returns the sorted 1-based chunk numbers present for an id.
    pub fn uploaded_chunks(&self, upload_id: &str) -> Vec<u32> {
        let mut chunks = Vec::new();
        let prefix = format!("{upload_id}_chunk_");
        if let Ok(entries) = std::fs::read_dir(&self.temp_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str()
                    && let Some(n) = name.strip_prefix(&prefix)
                    && let Ok(n) = n.parse::<u32>()
                {
                    chunks.push(n);
                }
            }
        }
        chunks.sort_unstable();
        chunks
    }

    /// Removes every temp file belonging to an id. Idempotent.
    pub fn remove_session(&self, upload_id: &str) -> Result<(), ReceiverError> {
        let prefix = format!("{upload_id}_");
        if let Ok(entries) = std::fs::read_dir(&self.temp_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str()
                    && name.starts_with(&prefix)
                {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
        Ok(())
    }

    /// Concatenates chunks `1..=total_chunks` into `final_path`,
    /// atomically: bytes land in a `.part` file in the destination
    /// directory, renamed into place only when complete.
    ///
    /// Caller must have verified that every chunk is present. Temp
    /// files are removed after the rename.
    pub fn assemble(
        &self,
        info: &ChunkMetadata,
        final_path: &Path,
    ) -> Result<(), ReceiverError> {
        let dir = final_path.parent().ok_or_else(|| {
            ReceiverError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "final path has no parent directory",
            ))
        })?;
        std::fs::create_dir_all(dir)?;

        let file_name = final_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact");
        let part_path = dir.join(format!(".{file_name}.part"));

        let mut part = std::fs::File::create(&part_path)?;
        let written = (|| {
            for n in 1..=info.total_chunks {
                let data = std::fs::read(self.chunk_path(&info.upload_id, n))?;
                part.write_all(&data)?;
            }
            part.sync_all()
        })();
        drop(part);
        if let Err(e) = written {
            // No stray .part files on a failed assembly.
            let _ = std::fs::remove_file(&part_path);
            return Err(e.into());
        }

        if let Err(e) = std::fs::rename(&part_path, final_path) {
            let _ = std::fs::remove_file(&part_path);
            return Err(e.into());
        }
        debug!(upload_id = %info.upload_id, path = %final_path.display(), "artifact assembled");

        self.remove_session(&info.upload_id)?;
        Ok(())
    }

    /// Removes temp files older than `max_age`. Returns the number of
    /// files removed and the distinct session ids they belonged to.
    ///
    /// Sessions abandoned without a cancel call (client crash, lost
    /// connectivity) are reclaimed by running this periodically.
    pub fn cleanup_expired(
        &self,
        max_age: Duration,
    ) -> Result<(usize, Vec<String>), ReceiverError> {
        if !self.temp_dir.exists() {
            return Ok((0, Vec::new()));
        }
        let now = SystemTime::now();
        let mut removed = 0;
        let mut expired_ids: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&self.temp_dir)?.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let Ok(modified) = meta.modified() else { continue };
            if now.duration_since(modified).unwrap_or(Duration::ZERO) >= max_age
                && std::fs::remove_file(entry.path()).is_ok()
            {
                removed += 1;
                if let Some(name) = entry.file_name().to_str()
                    && let Some(id) = session_id_of(name)
                    && !expired_ids.iter().any(|known| known == id)
                {
                    expired_ids.push(id.to_string());
                }
            }
        }
        if removed > 0 {
            debug!(removed, "expired upload temp files removed");
        }
        Ok((removed, expired_ids))
    }
}

/// Extracts the upload id from a temp file name, for either of the
/// two layouts the store writes.
fn session_id_of(name: &str) -> Option<&str> {
    if let Some(id) = name.strip_suffix("_info.json") {
        return Some(id);
    }
    name.rfind("_chunk_").map(|at| &name[..at])
}
