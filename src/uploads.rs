use std::path::{Path, PathBuf};

/// Audio formats accepted by the upload form
pub const ALLOWED_AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "wav", "ogg", "m4a"];

/// Transcript formats accepted by the upload form
pub const ALLOWED_PDF_EXTENSIONS: [&str; 1] = ["pdf"];

/// Lowercased extension after the last dot, if any
pub fn extension_of(filename: &str) -> Option<String> {
    let idx = filename.rfind('.')?;
    let ext = &filename[idx + 1..];
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_allowed_audio(filename: &str) -> bool {
    matches!(extension_of(filename), Some(ext) if ALLOWED_AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_allowed_pdf(filename: &str) -> bool {
    matches!(extension_of(filename), Some(ext) if ALLOWED_PDF_EXTENSIONS.contains(&ext.as_str()))
}

/// Validate a client-supplied filename for use as a storage key.
///
/// The original filename is the storage key, stored verbatim; anything that
/// could escape the store directory (path separators, `..` components, empty
/// names) is rejected rather than rewritten.
pub fn sanitize_filename(name: &str) -> Option<&str> {
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return None;
    }
    Some(name)
}

/// Write submitted bytes verbatim into the upload store.
///
/// Returns the stored path. The filename must already be sanitized.
pub fn store_upload(dir: &Path, filename: &str, data: &[u8]) -> Result<PathBuf, String> {
    let path = dir.join(filename);
    std::fs::write(&path, data)
        .map_err(|e| format!("Failed to save upload '{}': {}", path.display(), e))?;
    Ok(path)
}
