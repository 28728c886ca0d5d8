//! Writing verified reconstructions to disk.
//!
//! The filename in the session metadata is sender-controlled input and is
//! sanitised before it touches the filesystem: path separators and
//! traversal components never survive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

/// Fallback name when the advertised filename sanitises to nothing.
const FALLBACK_NAME: &str = "received.bin";

/// Reduce a sender-supplied filename to a safe single path component.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = last.chars().filter(|&c| c != '\0').collect();
    match cleaned.as_str() {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        _ => cleaned,
    }
}

/// Write reconstructed bytes into `dir` under the advertised filename.
///
/// The name is sanitised first; an existing file is never overwritten,
/// a numeric suffix is appended instead. Returns the path written.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn save_to_dir(dir: &Path, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    let name = sanitize_filename(filename);
    let mut path = dir.join(&name);

    let stem = Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    let ext = Path::new(&name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1;
    while path.exists() {
        path = dir.join(format!("{stem}-{counter}{ext}"));
        counter += 1;
    }

    fs::write(&path, bytes)?;
    info!(path = %path.display(), size = bytes.len(), "saved reconstructed file");
    Ok(path)
}
