//! Orphan tracking across save/load cycles.
//!
//! Each load scans the active player's object directory and marks every file
//! pending deletion. Files are un-marked one by one as gameplay claims them
//! through reads; whatever is still pending when the day ends belongs to no
//! live object and gets deleted by the sweep.

use crate::store::PlayerKey;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Per-player tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    /// No scan has run for this player yet.
    #[default]
    Unloaded,
    /// The pending set reflects the last scan minus all claims since.
    Scanned,
    /// A sweep is deleting pending files right now.
    Reconciling,
}

/// Tracks which persisted object files are still unclaimed for each player.
#[derive(Debug, Default)]
pub struct LivenessTracker {
    pending: HashMap<String, HashSet<PathBuf>>,
    states: HashMap<String, TrackerState>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tracking state for `player`.
    pub fn state(&self, player: &PlayerKey) -> TrackerState {
        self.states
            .get(&player.dir_name())
            .copied()
            .unwrap_or_default()
    }

    /// Number of files still pending deletion for `player`.
    pub fn pending_count(&self, player: &PlayerKey) -> usize {
        self.pending
            .get(&player.dir_name())
            .map_or(0, HashSet::len)
    }

    /// Whether `path` is currently marked for deletion.
    pub fn is_pending(&self, player: &PlayerKey, path: &Path) -> bool {
        self.pending
            .get(&player.dir_name())
            .is_some_and(|files| files.contains(path))
    }

    /// Rebuild the pending set for `player` from the files under `dir`.
    ///
    /// A missing directory is treated as an empty one. Returns the number of
    /// files now pending.
    pub fn scan(&mut self, player: &PlayerKey, dir: &Path) -> io::Result<usize> {
        let mut files = HashSet::new();
        if dir.is_dir() {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("json")
                {
                    files.insert(path);
                }
            }
        }

        let count = files.len();
        debug!("scanned {count} saved object file(s) for {player}");
        let key = player.dir_name();
        self.pending.insert(key.clone(), files);
        self.states.insert(key, TrackerState::Scanned);
        Ok(count)
    }

    /// Un-mark `path` as pending deletion because a live object claimed it.
    ///
    /// Silently does nothing before the first scan or when the file is not in
    /// the set; a file removed here is never re-added without a fresh scan.
    pub fn claim(&mut self, player: &PlayerKey, path: &Path) {
        let key = player.dir_name();
        match self.states.get(&key).copied().unwrap_or_default() {
            TrackerState::Unloaded => {}
            TrackerState::Reconciling => {
                // Guard against reentrant claims; the host's event ordering
                // makes this unreachable today.
                warn!(
                    "claim of {} for {player} rejected: sweep in progress",
                    path.display()
                );
            }
            TrackerState::Scanned => {
                if let Some(files) = self.pending.get_mut(&key) {
                    files.remove(path);
                }
            }
        }
    }

    /// Delete every file still pending for `player` and clear the set.
    ///
    /// Individual delete failures are logged and skipped so one bad file
    /// cannot block cleanup of the rest. A player that was never scanned is a
    /// no-op. Returns the number of files deleted.
    pub fn sweep(&mut self, player: &PlayerKey) -> usize {
        let key = player.dir_name();
        if self.states.get(&key).copied().unwrap_or_default() == TrackerState::Unloaded {
            return 0;
        }

        self.states.insert(key.clone(), TrackerState::Reconciling);
        let files = self.pending.get_mut(&key).map(std::mem::take).unwrap_or_default();

        let mut deleted = 0;
        for path in &files {
            match fs::remove_file(path) {
                Ok(()) => deleted += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!("failed to delete orphaned file {}: {err}", path.display());
                }
            }
        }
        debug!("swept {deleted} orphaned file(s) for {player}");
        self.states.insert(key, TrackerState::Scanned);
        deleted
    }
}
