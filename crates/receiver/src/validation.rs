use std::path::Path;

use crate::ReceiverError;

const MAX_UPLOAD_ID_LEN: usize = 64;

/// Validates a client-supplied upload id before it is used in temp
/// file names.
///
/// Accepts only ASCII alphanumerics, `-` and `_`, up to 64 chars.
/// Anything that could escape the temp directory is rejected.
pub fn validate_upload_id(upload_id: &str) -> Result<(), ReceiverError> {
    if upload_id.is_empty() {
        return Err(ReceiverError::InvalidUploadId("empty".into()));
    }
    if upload_id.len() > MAX_UPLOAD_ID_LEN {
        return Err(ReceiverError::InvalidUploadId(format!(
            "longer than {MAX_UPLOAD_ID_LEN} chars"
        )));
    }
    if !upload_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ReceiverError::InvalidUploadId(upload_id.to_string()));
    }
    Ok(())
}

/// Validates a client-supplied file name.
///
/// The name is advisory (only its extension survives into the stored
/// artifact), but it must not carry path separators or traversal.
pub fn validate_file_name(file_name: &str) -> Result<(), ReceiverError> {
    if file_name.is_empty() {
        return Err(ReceiverError::InvalidFileName("empty".into()));
    }
    if file_name.contains('/') || file_name.contains('\\') {
        return Err(ReceiverError::InvalidFileName(format!(
            "path separator not allowed: {file_name}"
        )));
    }
    if file_name == "." || file_name == ".." {
        return Err(ReceiverError::InvalidFileName(file_name.to_string()));
    }
    Ok(())
}

/// Extracts the extension of `file_name`, falling back to `default`
/// when there is none or it contains non-alphanumeric characters.
pub fn safe_extension(file_name: &str, default: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| default.to_string())
}
