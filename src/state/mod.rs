//! The persistent sync state tracker.
//!
//! One [SyncRecord] per sync tuple, stored in a pretty-printed TOML file so
//! it survives process restarts and can be inspected by hand. The tracker is
//! an optimization and audit trail, never a correctness dependency — the
//! delta resolver recomputes the real state from a live ancestor-closure
//! comparison every run.

use crate::{
    errors::{SyncError, SyncResult},
    tuple::SyncTuple,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

/// The recorded outcome of the most recent run for a tuple.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordedOutcome {
    /// Nothing to sync.
    NoOp,
    /// All new commits were applied and published.
    Clean,
    /// Replay blocked on a conflict; a pull request needs manual resolution.
    Conflict,
    /// The run failed before publishing anything.
    Failed,
}

/// The durable record of one sync tuple's progress.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncRecord {
    /// The source tip last synced cleanly into the target. Once set, only
    /// ever advances to a descendant; moving it backwards requires an
    /// explicit operator reset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_sha: Option<String>,
    /// When the tuple was last processed.
    pub last_sync_at: DateTime<Utc>,
    /// How the last run ended.
    pub outcome: RecordedOutcome,
}

/// The TOML shape of the state file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    records: BTreeMap<String, SyncRecord>,
}

/// Tracks sync records on disk, keyed by [SyncTuple::state_key].
#[derive(Debug)]
pub struct SyncTracker {
    path: PathBuf,
    records: BTreeMap<String, SyncRecord>,
}

impl SyncTracker {
    /// Loads the tracker from `path`. A missing file yields an empty tracker.
    pub fn load(path: &Path) -> SyncResult<Self> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                records: BTreeMap::new(),
            });
        }

        let raw = std::fs::read_to_string(path)?;
        let file: StateFile =
            toml::from_str(&raw).map_err(|e| SyncError::State(e.to_string()))?;
        Ok(Self {
            path: path.to_path_buf(),
            records: file.records,
        })
    }

    /// Returns the record for the given tuple, if one exists.
    pub fn last_synced(&self, tuple: &SyncTuple) -> Option<&SyncRecord> {
        self.records.get(&tuple.state_key())
    }

    /// Records a successful sync up to `sha` (the source tip).
    ///
    /// `ancestors_of_sha` is the ancestor closure of `sha`; the previously
    /// recorded sha must be in it, otherwise the advance would regress
    /// history and is refused.
    pub fn record_success(
        &mut self,
        tuple: &SyncTuple,
        sha: &str,
        ancestors_of_sha: &HashSet<String>,
        outcome: RecordedOutcome,
        at: DateTime<Utc>,
    ) -> SyncResult<()> {
        let key = tuple.state_key();
        if let Some(record) = self.records.get(&key) {
            if let Some(stored) = record.last_synced_sha.as_deref() {
                if stored != sha && !ancestors_of_sha.contains(stored) {
                    return Err(SyncError::SyncStateRegression {
                        stored: stored.to_string(),
                        proposed: sha.to_string(),
                    });
                }
            }
        }

        self.records.insert(
            key,
            SyncRecord {
                last_synced_sha: Some(sha.to_string()),
                last_sync_at: at,
                outcome,
            },
        );
        Ok(())
    }

    /// Records a run that did not advance the synced sha (conflict or
    /// failure). The previously recorded sha, if any, is preserved.
    pub fn record_failure(
        &mut self,
        tuple: &SyncTuple,
        outcome: RecordedOutcome,
        at: DateTime<Utc>,
    ) {
        let key = tuple.state_key();
        let last_synced_sha = self
            .records
            .get(&key)
            .and_then(|r| r.last_synced_sha.clone());
        self.records.insert(
            key,
            SyncRecord {
                last_synced_sha,
                last_sync_at: at,
                outcome,
            },
        );
    }

    /// Removes the record for the given tuple. This is the operator-facing
    /// reset: the only path by which a recorded sha may move backwards.
    ///
    /// Returns `true` if a record existed.
    pub fn reset(&mut self, tuple: &SyncTuple) -> bool {
        self.records.remove(&tuple.state_key()).is_some()
    }

    /// Persists the tracker to disk.
    pub fn write(&self) -> SyncResult<()> {
        let file = StateFile {
            records: self.records.clone(),
        };
        let raw =
            toml::to_string_pretty(&file).map_err(|e| SyncError::State(e.to_string()))?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{RecordedOutcome, SyncTracker};
    use crate::{errors::SyncError, tuple::SyncTuple};
    use chrono::Utc;
    use std::collections::HashSet;

    fn tuple() -> SyncTuple {
        SyncTuple {
            source: "up/source".parse().unwrap(),
            target: "down/target".parse().unwrap(),
            source_branch: "main".to_string(),
            target_branch: "main".to_string(),
        }
    }

    fn closure(shas: &[&str]) -> HashSet<String> {
        shas.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = SyncTracker::load(&dir.path().join("state.toml")).unwrap();
        assert!(tracker.last_synced(&tuple()).is_none());
    }

    #[test]
    fn record_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");

        let mut tracker = SyncTracker::load(&path).unwrap();
        tracker
            .record_success(
                &tuple(),
                "abc123",
                &closure(&["abc123"]),
                RecordedOutcome::Clean,
                Utc::now(),
            )
            .unwrap();
        tracker.write().unwrap();

        let reloaded = SyncTracker::load(&path).unwrap();
        let record = reloaded.last_synced(&tuple()).unwrap();
        assert_eq!(record.last_synced_sha.as_deref(), Some("abc123"));
        assert_eq!(record.outcome, RecordedOutcome::Clean);
    }

    #[test]
    fn advance_to_descendant_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = SyncTracker::load(&dir.path().join("state.toml")).unwrap();

        tracker
            .record_success(
                &tuple(),
                "a",
                &closure(&["a"]),
                RecordedOutcome::Clean,
                Utc::now(),
            )
            .unwrap();
        // "b" descends from "a": its closure contains "a".
        tracker
            .record_success(
                &tuple(),
                "b",
                &closure(&["a", "b"]),
                RecordedOutcome::Clean,
                Utc::now(),
            )
            .unwrap();

        let record = tracker.last_synced(&tuple()).unwrap();
        assert_eq!(record.last_synced_sha.as_deref(), Some("b"));
    }

    #[test]
    fn regression_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = SyncTracker::load(&dir.path().join("state.toml")).unwrap();

        tracker
            .record_success(
                &tuple(),
                "b",
                &closure(&["a", "b"]),
                RecordedOutcome::Clean,
                Utc::now(),
            )
            .unwrap();
        // "c" does not have "b" among its ancestors.
        let err = tracker
            .record_success(
                &tuple(),
                "c",
                &closure(&["a", "c"]),
                RecordedOutcome::Clean,
                Utc::now(),
            )
            .unwrap_err();

        assert!(matches!(err, SyncError::SyncStateRegression { .. }));
        // The stored record is untouched.
        let record = tracker.last_synced(&tuple()).unwrap();
        assert_eq!(record.last_synced_sha.as_deref(), Some("b"));
    }

    #[test]
    fn reset_clears_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = SyncTracker::load(&dir.path().join("state.toml")).unwrap();

        tracker
            .record_success(
                &tuple(),
                "b",
                &closure(&["a", "b"]),
                RecordedOutcome::Clean,
                Utc::now(),
            )
            .unwrap();
        assert!(tracker.reset(&tuple()));
        assert!(tracker.last_synced(&tuple()).is_none());

        // After a reset, any sha may be recorded again.
        tracker
            .record_success(
                &tuple(),
                "c",
                &closure(&["c"]),
                RecordedOutcome::Clean,
                Utc::now(),
            )
            .unwrap();
    }

    #[test]
    fn failure_preserves_the_synced_sha() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = SyncTracker::load(&dir.path().join("state.toml")).unwrap();

        tracker
            .record_success(
                &tuple(),
                "a",
                &closure(&["a"]),
                RecordedOutcome::Clean,
                Utc::now(),
            )
            .unwrap();
        tracker.record_failure(&tuple(), RecordedOutcome::Failed, Utc::now());

        let record = tracker.last_synced(&tuple()).unwrap();
        assert_eq!(record.last_synced_sha.as_deref(), Some("a"));
        assert_eq!(record.outcome, RecordedOutcome::Failed);
    }
}
