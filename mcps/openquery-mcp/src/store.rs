//! Whole-file JSON persistence
//!
//! Every persisted store in this server (database directory, plot registry,
//! mediators) is a single JSON file read fully into memory and rewritten
//! wholesale on change. Writes go through a temp file in the same directory
//! followed by a rename, so readers never observe a half-written file.
//! Serializing writers is the caller's job; each store holds its own lock
//! around read-modify-write.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;

use crate::error::Result;

/// Read a JSON store, returning `T::default()` when the file does not exist
pub async fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match fs::read_to_string(path).await {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Atomically replace a JSON store: write a temp file, then rename over the
/// target
pub async fn write_json_atomic<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
