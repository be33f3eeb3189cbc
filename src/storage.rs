//! On-disk persistence helpers.
//!
//! Every managed file is replaced atomically: content is written to
//! `<path>.tmp` and renamed over the destination, so readers observe either
//! the old or the new file, never a partial one.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{PapyrusError, Result};

/// Path of the temporary sibling used for atomic replacement.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Atomically replace `path` with the given bytes.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
    }

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        PapyrusError::storage(format!("Failed to replace {}: {e}", path.display()))
    })
}

/// Atomically replace `path` with the compact JSON form of `value`.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    atomic_write_bytes(path, &bytes)
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let value = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok(value)
}

/// Read a JSON file, treating a missing or corrupted file as the default
/// value. Corruption is logged; the caller continues with reduced state.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    match read_json(path) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                "[Storage] Treating corrupted file {} as empty: {e}",
                path.display()
            );
            T::default()
        }
    }
}

/// Delete files in `dir` older than `max_age`. Returns the number removed.
pub fn clean_stale_files(dir: &Path, max_age: Duration) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => continue,
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age > max_age {
            if let Err(e) = fs::remove_file(&path) {
                warn!("[Storage] Could not remove stale file {}: {e}", path.display());
            } else {
                removed += 1;
            }
        }
    }

    Ok(removed)
}
