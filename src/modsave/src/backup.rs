//! Rotated snapshots of a player's object directory with hash tracking.
//!
//! Before the host writes a save, the store can snapshot the player's object
//! files into `Backups/backup-NNNN/`. A SHA-256 hash of the whole tree is
//! recorded alongside the snapshots; when nothing changed since the last
//! snapshot, no new one is taken. Old snapshots beyond the keep count are
//! pruned, oldest first.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File inside the backups directory recording the last snapshot hash.
const METADATA_FILE: &str = "backup.json";
/// Snapshot directory name prefix.
const SNAPSHOT_PREFIX: &str = "backup-";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Metadata tracking the object-tree hash of the newest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Hash of the object directory when the last snapshot was taken.
    pub last_hash: String,
}

/// Compute a SHA-256 hash over every object file in `dir`, in name order.
///
/// A missing or empty directory hashes to the digest of no input, so the
/// result is stable across platforms and enumeration order.
pub fn hash_tree(dir: &Path) -> Result<String, BackupError> {
    let mut hasher = Sha256::new();
    for path in object_files(dir)? {
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            hasher.update(name.as_bytes());
        }
        hasher.update(fs::read(&path)?);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Read snapshot metadata if it exists.
pub fn read_metadata(backups_dir: &Path) -> Result<Option<BackupMetadata>, BackupError> {
    let path = backups_dir.join(METADATA_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}

/// Write snapshot metadata.
pub fn write_metadata(backups_dir: &Path, metadata: &BackupMetadata) -> Result<(), BackupError> {
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(backups_dir.join(METADATA_FILE), json)?;
    Ok(())
}

/// Snapshot `object_dir` into `backups_dir` unless its contents are unchanged
/// since the last snapshot, then prune down to `keep` snapshots.
///
/// Returns whether a new snapshot was created.
pub fn snapshot(object_dir: &Path, backups_dir: &Path, keep: usize) -> Result<bool, BackupError> {
    let files = object_files(object_dir)?;
    if files.is_empty() {
        return Ok(false);
    }

    let current = hash_tree(object_dir)?;
    if let Some(metadata) = read_metadata(backups_dir)? {
        if metadata.last_hash == current {
            return Ok(false);
        }
    }

    let index = list_snapshots(backups_dir)?
        .last()
        .map_or(1, |(index, _)| index + 1);
    let target = backups_dir.join(format!("{SNAPSHOT_PREFIX}{index:04}"));
    fs::create_dir_all(&target)?;
    for path in &files {
        if let Some(name) = path.file_name() {
            fs::copy(path, target.join(name))?;
        }
    }

    write_metadata(backups_dir, &BackupMetadata { last_hash: current })?;
    prune(backups_dir, keep)?;
    Ok(true)
}

/// List snapshot directories under `backups_dir`, oldest first.
pub fn list_snapshots(backups_dir: &Path) -> Result<Vec<(u32, PathBuf)>, BackupError> {
    let mut snapshots = Vec::new();
    if !backups_dir.is_dir() {
        return Ok(snapshots);
    }
    for entry in fs::read_dir(backups_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let index = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(SNAPSHOT_PREFIX))
            .and_then(|digits| digits.parse::<u32>().ok());
        if let Some(index) = index {
            snapshots.push((index, path));
        }
    }
    snapshots.sort_by_key(|(index, _)| *index);
    Ok(snapshots)
}

/// Delete the oldest snapshots until at most `keep` remain.
pub fn prune(backups_dir: &Path, keep: usize) -> Result<(), BackupError> {
    let snapshots = list_snapshots(backups_dir)?;
    if snapshots.len() <= keep {
        return Ok(());
    }
    for (_, path) in &snapshots[..snapshots.len() - keep] {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

fn object_files(dir: &Path) -> Result<Vec<PathBuf>, BackupError> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
