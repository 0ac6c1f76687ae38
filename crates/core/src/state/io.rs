//! # IO Utilities
//!
//! Base path resolution and the atomic write primitive every checkpoint
//! goes through.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Environment variable overriding the base path
pub const HOME_VAR: &str = "MATRIOSKA_HOME";

/// Checkpoint directory name under the base path
pub const CHECKPOINT_DIR: &str = "matrioska_checkpoints";

/// Artifact directory name under the base path
pub const ARTIFACT_DIR: &str = "matrioska_artifacts";

/// Resolve the base path: explicit value, then `MATRIOSKA_HOME`, then the
/// current directory
pub fn resolve_base_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(HOME_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Write `content` so readers see either the old file or the new one.
///
/// The bytes go to a sibling temp file which is synced and then renamed
/// over the target.
pub async fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("Failed to create directory: {:?}", parent))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file path: {:?}", path))?;
    let temp_path = parent.join(format!(".{}.tmp", file_name));

    let mut file = fs::File::create(&temp_path)
        .await
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
    file.write_all(content)
        .await
        .with_context(|| format!("Failed to write temp file: {:?}", temp_path))?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, path)
        .await
        .with_context(|| format!("Failed to move {:?} into place", path))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {:?}", path))?;
    atomic_write(path, content.as_bytes()).await
}

/// Read a JSON document, or `None` when the file does not exist
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read file: {:?}", path)),
    };

    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(Some(value))
}
