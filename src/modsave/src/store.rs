//! Per-player object persistence.
//!
//! Objects live under `{root}/SaveData/{name}_{id}/SavedObjectInformation/`,
//! one JSON envelope per key. The store owns that tree exclusively and
//! threads the active player through every call; it never reaches into
//! ambient game state to find out whose save is loaded.
//!
//! The host drives the store with two lifecycle signals:
//! [`SaveStore::on_save_loaded`] after a save loads and
//! [`SaveStore::on_day_ending`] right before the game writes its own save.
//! Between the two, every successful [`SaveStore::read`] claims its file;
//! whatever is never claimed is an orphan and gets deleted by the sweep.

use crate::backup::{self, BackupError};
use crate::codec::{Codec, CodecError};
use crate::registry::{DecodeRegistry, RegistryError};
use crate::tracker::LivenessTracker;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory under the root holding all per-player save data.
pub const SAVE_DATA_DIR: &str = "SaveData";
/// Per-player directory holding the serialized object files.
pub const OBJECT_DIR: &str = "SavedObjectInformation";
/// Directory under the root holding seeded content files.
pub const CONTENT_DIR: &str = "Content";
/// Per-player directory holding rotated backups.
pub const BACKUP_DIR: &str = "Backups";

/// Identifies a save slot: player name plus the save's unique id.
///
/// The pair is stable for the lifetime of a save file and doubles as the
/// player's directory name, `{name}_{unique_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerKey {
    pub name: String,
    pub unique_id: u64,
}

impl PlayerKey {
    pub fn new(name: impl Into<String>, unique_id: u64) -> Self {
        PlayerKey {
            name: name.into(),
            unique_id,
        }
    }

    /// The directory name for this player's save data.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.name, self.unique_id)
    }
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.unique_id)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No saved object `{key}` for player {player}")]
    NotFound { player: String, key: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The player-scoped object store.
pub struct SaveStore {
    root: PathBuf,
    codec: Codec,
    tracker: LivenessTracker,
}

impl SaveStore {
    /// Create a store rooted at `root` with the default codec.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_codec(root, Codec::new())
    }

    /// Create a store rooted at `root` with a caller-configured codec.
    pub fn with_codec(root: impl Into<PathBuf>, codec: Codec) -> Self {
        SaveStore {
            root: root.into(),
            codec,
            tracker: LivenessTracker::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Mutable codec access, for registering extra conversion rules.
    pub fn codec_mut(&mut self) -> &mut Codec {
        &mut self.codec
    }

    pub fn tracker(&self) -> &LivenessTracker {
        &self.tracker
    }

    /// The directory holding `player`'s serialized objects.
    pub fn object_dir(&self, player: &PlayerKey) -> PathBuf {
        self.root
            .join(SAVE_DATA_DIR)
            .join(player.dir_name())
            .join(OBJECT_DIR)
    }

    /// The file path for `player`'s object stored under `key`.
    pub fn object_path(&self, player: &PlayerKey, key: &str) -> PathBuf {
        self.object_dir(player).join(format!("{key}.json"))
    }

    /// Persist `value` under `key` for `player`, overwriting any previous
    /// object. Intermediate directories are created as needed.
    pub fn write<T: Serialize>(
        &self,
        player: &PlayerKey,
        key: &str,
        tag: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let text = self.codec.encode(tag, value)?;
        let path = self.object_path(player, key);
        write_atomic(&path, text.as_bytes())?;
        Ok(())
    }

    /// Read back the object stored under `key` for `player`.
    ///
    /// A readable file is claimed with the liveness tracker before decoding,
    /// so a corrupt payload surfaces an error but survives the end-of-day
    /// sweep for inspection.
    pub fn read<T: DeserializeOwned>(
        &mut self,
        player: &PlayerKey,
        key: &str,
        tag: &str,
    ) -> Result<T, StoreError> {
        let text = self.read_raw(player, key)?;
        Ok(self.codec.decode(&text, tag)?)
    }

    /// Read and claim the raw envelope text stored under `key`.
    pub fn read_raw(&mut self, player: &PlayerKey, key: &str) -> Result<String, StoreError> {
        let path = self.object_path(player, key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    player: player.to_string(),
                    key: key.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        self.tracker.claim(player, &path);
        Ok(text)
    }

    /// Read an object whose concrete type is only known at runtime, resolved
    /// through the tag recorded in its envelope.
    pub fn read_dynamic(
        &mut self,
        registry: &DecodeRegistry,
        player: &PlayerKey,
        key: &str,
    ) -> Result<Box<dyn Any>, StoreError> {
        let text = self.read_raw(player, key)?;
        Ok(registry.decode(&self.codec, &text)?)
    }

    /// Delete the object stored under `key`. Idempotent: deleting an absent
    /// object is not an error.
    pub fn delete(&self, player: &PlayerKey, key: &str) -> Result<(), StoreError> {
        let path = self.object_path(player, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// List the keys of every object currently persisted for `player`.
    pub fn list_keys(&self, player: &PlayerKey) -> Result<Vec<String>, StoreError> {
        let dir = self.object_dir(player);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Host signal: a save finished loading. Rescans `player`'s object files
    /// and marks them all pending deletion until claimed.
    pub fn on_save_loaded(&mut self, player: &PlayerKey) -> Result<usize, StoreError> {
        let dir = self.object_dir(player);
        Ok(self.tracker.scan(player, &dir)?)
    }

    /// Host signal: the in-game day is ending and the game is about to save.
    /// Deletes every still-unclaimed object file for `player` and returns how
    /// many were removed.
    pub fn on_day_ending(&mut self, player: &PlayerKey) -> usize {
        self.tracker.sweep(player)
    }

    /// The directory holding `player`'s rotated backups.
    pub fn backups_dir(&self, player: &PlayerKey) -> PathBuf {
        self.root
            .join(SAVE_DATA_DIR)
            .join(player.dir_name())
            .join(BACKUP_DIR)
    }

    /// Snapshot `player`'s object files unless nothing changed since the last
    /// snapshot, keeping at most `keep` snapshots. Returns whether a new
    /// snapshot was taken.
    pub fn backup_player(&self, player: &PlayerKey, keep: usize) -> Result<bool, BackupError> {
        backup::snapshot(&self.object_dir(player), &self.backups_dir(player), keep)
    }

    /// Seed a content file at `{root}/Content/{folder}/{name}.json`.
    ///
    /// Does nothing if the file already exists, so user edits are never
    /// overwritten. Returns whether the file was written.
    pub fn write_content_file<T: Serialize>(
        &self,
        folder: &str,
        name: &str,
        tag: &str,
        value: &T,
    ) -> Result<bool, StoreError> {
        let path = self.content_path(folder, name);
        if path.exists() {
            return Ok(false);
        }
        let text = self.codec.encode(tag, value)?;
        write_atomic(&path, text.as_bytes())?;
        Ok(true)
    }

    /// Read a content file, or `None` if it was never seeded.
    pub fn read_content_file<T: DeserializeOwned>(
        &self,
        folder: &str,
        name: &str,
        tag: &str,
    ) -> Result<Option<T>, StoreError> {
        let path = self.content_path(folder, name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(self.codec.decode(&text, tag)?))
    }

    fn content_path(&self, folder: &str, name: &str) -> PathBuf {
        self.root
            .join(CONTENT_DIR)
            .join(folder)
            .join(format!("{name}.json"))
    }
}

/// Write `bytes` to `path` through a temp file and rename, creating
/// intermediate directories. Single-process access is assumed; the rename
/// only protects against torn writes.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Recipe {
        a: u32,
    }

    fn ash() -> PlayerKey {
        PlayerKey::new("Ash", 42)
    }

    #[test]
    fn write_then_read_roundtrips() -> Result<()> {
        let dir = tempdir()?;
        let mut store = SaveStore::new(dir.path());

        store.write(&ash(), "Recipe1", "recipe", &Recipe { a: 1 })?;
        let decoded: Recipe = store.read(&ash(), "Recipe1", "recipe")?;
        assert_eq!(decoded, Recipe { a: 1 });
        Ok(())
    }

    #[test]
    fn layout_matches_the_save_tree() -> Result<()> {
        let dir = tempdir()?;
        let store = SaveStore::new(dir.path());

        store.write(&ash(), "Recipe1", "recipe", &Recipe { a: 1 })?;
        let expected = dir
            .path()
            .join("SaveData")
            .join("Ash_42")
            .join("SavedObjectInformation")
            .join("Recipe1.json");
        assert!(expected.is_file());
        Ok(())
    }

    #[test]
    fn write_leaves_no_temp_file() -> Result<()> {
        let dir = tempdir()?;
        let store = SaveStore::new(dir.path());

        store.write(&ash(), "Recipe1", "recipe", &Recipe { a: 1 })?;
        assert!(!store.object_dir(&ash()).join("Recipe1.json.tmp").exists());
        Ok(())
    }

    #[test]
    fn missing_key_is_not_found() -> Result<()> {
        let dir = tempdir()?;
        let mut store = SaveStore::new(dir.path());

        let err = store.read::<Recipe>(&ash(), "Recipe1", "recipe").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        Ok(())
    }

    #[test]
    fn wrong_tag_is_a_type_mismatch() -> Result<()> {
        let dir = tempdir()?;
        let mut store = SaveStore::new(dir.path());

        store.write(&ash(), "Recipe1", "recipe", &Recipe { a: 1 })?;
        let err = store.read::<Recipe>(&ash(), "Recipe1", "machine").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Codec(CodecError::TypeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn corrupt_file_surfaces_but_stays_on_disk() -> Result<()> {
        let dir = tempdir()?;
        let mut store = SaveStore::new(dir.path());

        store.write(&ash(), "Recipe1", "recipe", &Recipe { a: 1 })?;
        let path = store.object_path(&ash(), "Recipe1");
        fs::write(&path, "{ truncated")?;

        store.on_save_loaded(&ash())?;
        assert!(store.read::<Recipe>(&ash(), "Recipe1", "recipe").is_err());

        // The failed read still claimed the file, so the sweep leaves it
        // alone for inspection.
        store.on_day_ending(&ash());
        assert!(path.is_file());
        Ok(())
    }

    #[test]
    fn delete_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let store = SaveStore::new(dir.path());

        store.write(&ash(), "Recipe1", "recipe", &Recipe { a: 1 })?;
        store.delete(&ash(), "Recipe1")?;
        store.delete(&ash(), "Recipe1")?;
        Ok(())
    }

    #[test]
    fn list_keys_is_sorted() -> Result<()> {
        let dir = tempdir()?;
        let store = SaveStore::new(dir.path());

        store.write(&ash(), "Recipe2", "recipe", &Recipe { a: 2 })?;
        store.write(&ash(), "Recipe1", "recipe", &Recipe { a: 1 })?;
        assert_eq!(store.list_keys(&ash())?, vec!["Recipe1", "Recipe2"]);
        Ok(())
    }

    #[test]
    fn list_keys_for_unknown_player_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let store = SaveStore::new(dir.path());
        assert!(store.list_keys(&ash())?.is_empty());
        Ok(())
    }

    #[test]
    fn sweep_removes_unclaimed_objects() -> Result<()> {
        let dir = tempdir()?;
        let mut store = SaveStore::new(dir.path());
        let player = ash();

        store.write(&player, "Recipe1", "recipe", &Recipe { a: 1 })?;
        store.write(&player, "Recipe2", "recipe", &Recipe { a: 2 })?;

        store.on_save_loaded(&player)?;
        let decoded: Recipe = store.read(&player, "Recipe1", "recipe")?;
        assert_eq!(decoded, Recipe { a: 1 });

        let deleted = store.on_day_ending(&player);
        assert_eq!(deleted, 1);
        assert!(store.object_path(&player, "Recipe1").is_file());
        assert!(!store.object_path(&player, "Recipe2").exists());
        Ok(())
    }

    #[test]
    fn sweep_never_touches_other_players() -> Result<()> {
        let dir = tempdir()?;
        let mut store = SaveStore::new(dir.path());
        let p1 = PlayerKey::new("Ash", 42);
        let p2 = PlayerKey::new("Birch", 7);

        store.write(&p1, "Recipe1", "recipe", &Recipe { a: 1 })?;
        store.write(&p2, "Recipe1", "recipe", &Recipe { a: 1 })?;

        store.on_save_loaded(&p1)?;
        store.on_day_ending(&p1);

        assert!(!store.object_path(&p1, "Recipe1").exists());
        assert!(store.object_path(&p2, "Recipe1").is_file());
        Ok(())
    }

    #[test]
    fn read_before_load_still_works() -> Result<()> {
        let dir = tempdir()?;
        let mut store = SaveStore::new(dir.path());

        store.write(&ash(), "Recipe1", "recipe", &Recipe { a: 1 })?;
        // No on_save_loaded yet: the claim is a no-op, the read succeeds.
        let decoded: Recipe = store.read(&ash(), "Recipe1", "recipe")?;
        assert_eq!(decoded, Recipe { a: 1 });
        Ok(())
    }

    #[test]
    fn content_files_are_seeded_once() -> Result<()> {
        let dir = tempdir()?;
        let store = SaveStore::new(dir.path());

        assert!(store.write_content_file("Recipes", "defaults", "recipe", &Recipe { a: 1 })?);
        // A second seed must not clobber user edits.
        assert!(!store.write_content_file("Recipes", "defaults", "recipe", &Recipe { a: 9 })?);

        let loaded: Option<Recipe> = store.read_content_file("Recipes", "defaults", "recipe")?;
        assert_eq!(loaded, Some(Recipe { a: 1 }));
        Ok(())
    }

    #[test]
    fn backup_player_snapshots_the_object_dir() -> Result<()> {
        let dir = tempdir()?;
        let store = SaveStore::new(dir.path());
        let player = ash();

        store.write(&player, "Recipe1", "recipe", &Recipe { a: 1 })?;
        assert!(store.backup_player(&player, 3)?);
        assert!(!store.backup_player(&player, 3)?);

        let snapshots = crate::backup::list_snapshots(&store.backups_dir(&player))?;
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].1.join("Recipe1.json").is_file());
        Ok(())
    }

    #[test]
    fn missing_content_file_reads_as_none() -> Result<()> {
        let dir = tempdir()?;
        let store = SaveStore::new(dir.path());

        let loaded: Option<Recipe> = store.read_content_file("Recipes", "defaults", "recipe")?;
        assert_eq!(loaded, None);
        Ok(())
    }
}
