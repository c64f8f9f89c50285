//! On-disk record of a running countdown

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// File name under the per-user data directory.
pub const STATE_FILE_NAME: &str = "timer-state.json";

/// The persisted shape of a countdown.
///
/// `start_timestamp` is serialized as an ISO-8601 string, so the record
/// survives process restarts and system clock reads stay comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub original_duration_seconds: u64,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub is_running: bool,
}

impl PersistedState {
    /// Whole seconds left at `now`, clamped to >= 0.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        match self.start_timestamp {
            Some(started_at) => {
                let elapsed = now.signed_duration_since(started_at).num_seconds().max(0) as u64;
                self.original_duration_seconds.saturating_sub(elapsed)
            }
            None => 0,
        }
    }
}

/// Reads and writes the persisted countdown record.
///
/// Every public operation absorbs I/O and parse failures: the worst outcome
/// of a broken state file is a fresh start, never a crash.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location: `<user data dir>/curfew/timer-state.json`.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("curfew")
            .join(STATE_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the record to disk. A record that is not running deletes any
    /// existing file instead of writing one.
    pub fn save(&self, state: &PersistedState) {
        if !state.is_running {
            self.delete();
            return;
        }

        if let Err(e) = self.write_atomic(state) {
            warn!("failed to persist timer state: {:#}", e);
        }
    }

    fn write_atomic(&self, state: &PersistedState) -> Result<()> {
        let parent = self
            .path
            .parent()
            .context("state file path has no parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        // Write to a sibling temp file and rename into place, so a partial
        // write never clobbers the previous record.
        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        let payload = serde_json::to_vec_pretty(state).context("failed to serialize state")?;
        tmp.write_all(&payload).context("failed to write state")?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!("persisted timer state to {}", self.path.display());
        Ok(())
    }

    /// Load a resumable record, if one exists.
    ///
    /// Returns `None` when the file is absent, unreadable, not running, or
    /// already expired at `now`; the stale file is removed in the latter
    /// two cases.
    pub fn load(&self, now: DateTime<Utc>) -> Option<PersistedState> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("failed to read {}: {}", self.path.display(), e);
                return None;
            }
        };

        let state: PersistedState = match serde_json::from_slice(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!("discarding unreadable state file {}: {}", self.path.display(), e);
                self.delete();
                return None;
            }
        };

        if !state.is_running || state.start_timestamp.is_none() {
            debug!("persisted state is not running, discarding");
            self.delete();
            return None;
        }

        if state.remaining_seconds(now) == 0 {
            info!("persisted countdown already expired, discarding");
            self.delete();
            return None;
        }

        Some(state)
    }

    /// Remove the record. Absence is not an error.
    pub fn delete(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("removed state file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn store_in(dir: &tempfile::TempDir) -> StateStore {
        StateStore::new(dir.path().join(STATE_FILE_NAME))
    }

    #[test]
    fn save_load_round_trip_preserves_remaining() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let state = PersistedState {
            original_duration_seconds: 600,
            start_timestamp: Some(t0()),
            is_running: true,
        };
        store.save(&state);

        // loaded 40 seconds later: remaining shrinks by exactly the gap
        let now = t0() + Duration::seconds(40);
        let loaded = store.load(now).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.remaining_seconds(now), 560);
    }

    #[test]
    fn expired_record_is_discarded_and_deleted() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&PersistedState {
            original_duration_seconds: 30,
            start_timestamp: Some(t0()),
            is_running: true,
        });

        assert!(store.load(t0() + Duration::seconds(31)).is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_file_is_absorbed() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        fs::write(store.path(), b"{ not json").unwrap();
        assert!(store.load(t0()).is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        assert!(store_in(&dir).load(t0()).is_none());
    }

    #[test]
    fn saving_a_non_running_record_deletes_the_file() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&PersistedState {
            original_duration_seconds: 600,
            start_timestamp: Some(t0()),
            is_running: true,
        });
        assert!(store.path().exists());

        store.save(&PersistedState {
            original_duration_seconds: 0,
            start_timestamp: None,
            is_running: false,
        });
        assert!(!store.path().exists());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.delete();
        store.delete();
    }

    #[test]
    fn timestamps_are_iso_8601() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&PersistedState {
            original_duration_seconds: 90,
            start_timestamp: Some(t0()),
            is_running: true,
        });

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("2024-03-01T12:00:00Z"));
        assert!(raw.contains("originalDurationSeconds"));
        assert!(raw.contains("isRunning"));
    }
}
