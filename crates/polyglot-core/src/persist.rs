//! JSON documents on disk: tolerant load, atomic save.

use serde::{de::DeserializeOwned, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::PolyglotError;

/// Read a JSON document. A missing file yields `T::default()`.
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, PolyglotError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// Pretty-print `value` as UTF-8 JSON.
pub fn to_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, PolyglotError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Replace `path` with `bytes` via write-then-rename in the same directory.
///
/// A crash at any point leaves either the old or the new document, never
/// a partial one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PolyglotError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PolyglotError::Io(e.error))?;
    Ok(())
}

/// Serialize and atomically save `value` to `path`.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PolyglotError> {
    let bytes = to_json_bytes(value)?;
    write_atomic(path, &bytes)
}
