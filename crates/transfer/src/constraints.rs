use std::path::{Path, PathBuf};

use vidlift_protocol::UploadKind;

use crate::plan::ChunkPlan;
use crate::{DEFAULT_CHUNK_SIZE, UploadError};

/// Caller-supplied limits for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConstraints {
    /// Maximum accepted source file size in bytes.
    pub max_file_size: u64,
    /// Comma-separated MIME patterns, e.g. `"video/*"` or
    /// `"image/png, image/jpeg"`.
    pub accepted_types: String,
    /// Maximum bytes per chunk; the last chunk may be smaller.
    pub chunk_size: u64,
}

impl UploadConstraints {
    /// Default constraints for an upload kind.
    ///
    /// Uses [`DEFAULT_CHUNK_SIZE`] capped at the kind's chunk limit.
    pub fn for_kind(kind: UploadKind) -> Self {
        Self {
            max_file_size: kind.max_file_size(),
            accepted_types: kind.accepted_types().to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE.min(kind.max_chunk_size()),
        }
    }

    /// Returns `true` if `content_type` matches one of the accepted
    /// patterns.
    pub fn accepts(&self, content_type: &str) -> bool {
        self.accepted_types
            .split(',')
            .map(str::trim)
            .any(|pattern| mime_matches(pattern, content_type))
    }

    /// Validates a file against these constraints and computes its
    /// chunk plan.
    ///
    /// Fails before any session is created or network call made:
    /// - [`UploadError::FileTooLarge`] if the file exceeds
    ///   `max_file_size`
    /// - [`UploadError::EmptyFile`] for a zero-byte file
    /// - [`UploadError::UnacceptedType`] if `content_type` matches no
    ///   accepted pattern
    pub fn select_file(
        &self,
        path: &Path,
        content_type: &str,
    ) -> Result<SelectedFile, UploadError> {
        if !self.accepts(content_type) {
            return Err(UploadError::UnacceptedType(content_type.to_string()));
        }

        let total_size = std::fs::metadata(path)?.len();
        if total_size > self.max_file_size {
            return Err(UploadError::FileTooLarge {
                size: total_size,
                max: self.max_file_size,
            });
        }

        // Rejects zero-byte files and a zero chunk size.
        let plan = ChunkPlan::new(total_size, self.chunk_size)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                UploadError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("path has no file name: {}", path.display()),
                ))
            })?;

        Ok(SelectedFile {
            path: path.to_path_buf(),
            file_name,
            plan,
        })
    }
}

/// A validated file with its chunk plan: session parameters
/// computed, nothing sent yet.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub plan: ChunkPlan,
}

fn mime_matches(pattern: &str, content_type: &str) -> bool {
    if pattern == "*/*" {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(prefix) => content_type
            .split('/')
            .next()
            .is_some_and(|t| t.eq_ignore_ascii_case(prefix)),
        None => pattern.eq_ignore_ascii_case(content_type),
    }
}
