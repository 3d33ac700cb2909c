//! Local draft snapshot
//!
//! One JSON file per window under fixed keys (`draft.rosters`, `draft.lanes`,
//! `draft.analysis`). Loading is lenient: every key is optional and a key
//! that fails to parse is dropped on its own without losing the others.
//! Writes go through a temp file and a rename so a crash never leaves a
//! half-written snapshot behind.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SnapshotError;
use crate::model::{AnalysisMode, AnalysisResult, LaneAssignment, PerSide, Roster};

const ROSTERS_KEY: &str = "draft.rosters";
const LANES_KEY: &str = "draft.lanes";
const ANALYSIS_KEY: &str = "draft.analysis";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DraftSnapshot {
    #[serde(rename = "draft.rosters")]
    pub rosters: PerSide<Roster>,
    #[serde(rename = "draft.lanes")]
    pub lanes: PerSide<LaneAssignment>,
    #[serde(rename = "draft.analysis")]
    pub analysis: BTreeMap<AnalysisMode, AnalysisResult>,
    #[serde(rename = "savedAt", skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl DraftSnapshot {
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Object(mut fields) = value else {
            return Err(SnapshotError::Malformed(serde::de::Error::custom(
                "snapshot is not a JSON object",
            )));
        };

        let mut snapshot = DraftSnapshot::default();
        if let Some(v) = fields.remove(ROSTERS_KEY) {
            snapshot.rosters = lenient(ROSTERS_KEY, v);
        }
        if let Some(v) = fields.remove(LANES_KEY) {
            snapshot.lanes = lenient(LANES_KEY, v);
        }
        if let Some(Value::Object(modes)) = fields.remove(ANALYSIS_KEY) {
            for (mode, result) in modes {
                let Ok(mode) = mode.parse::<AnalysisMode>() else {
                    warn!(mode, "Dropping persisted analysis for unknown mode");
                    continue;
                };
                match serde_json::from_value::<Option<AnalysisResult>>(result) {
                    Ok(Some(result)) => {
                        snapshot.analysis.insert(mode, result);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(%mode, "Dropping unreadable persisted analysis: {}", e),
                }
            }
        }
        snapshot.saved_at = fields
            .remove("savedAt")
            .and_then(|v| serde_json::from_value(v).ok());
        Ok(snapshot)
    }
}

fn lenient<T: serde::de::DeserializeOwned + Default>(key: &str, value: Value) -> T {
    serde_json::from_value(value).unwrap_or_else(|e| {
        warn!(key, "Dropping unreadable snapshot key: {}", e);
        T::default()
    })
}

/// The snapshot file of one window.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<DraftSnapshot>, SnapshotError> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SnapshotError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        DraftSnapshot::from_json(&json).map(Some)
    }

    pub async fn save(&self, snapshot: &DraftSnapshot) -> Result<(), SnapshotError> {
        let mut snapshot = snapshot.clone();
        snapshot.saved_at = Some(Utc::now());
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self.path.with_extension("json.tmp");
        let write_err = |source| SnapshotError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        tokio::fs::write(&tmp, &json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        Ok(())
    }

    pub async fn remove(&self) -> Result<(), SnapshotError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SnapshotError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Persist every value published on `rx` (`None` removes the file) until
    /// cancelled. Bursts of changes collapse into one write. A value still
    /// unwritten at cancellation is flushed before the task exits.
    pub fn spawn_writer(
        self,
        mut rx: watch::Receiver<Option<DraftSnapshot>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let snapshot = rx.borrow_and_update().clone();
                self.write(snapshot.as_ref()).await;
            }

            let pending = {
                let current = rx.borrow_and_update();
                current.has_changed().then(|| current.clone())
            };
            if let Some(snapshot) = pending {
                self.write(snapshot.as_ref()).await;
            }
            debug!(path = ?self.path, "Snapshot writer stopped");
        })
    }

    async fn write(&self, snapshot: Option<&DraftSnapshot>) {
        let result = match snapshot {
            Some(snapshot) => self.save(snapshot).await,
            None => self.remove().await,
        };
        if let Err(e) = result {
            warn!("Failed to persist draft snapshot: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Lane, Unit};
    use std::time::Duration;

    fn sample() -> DraftSnapshot {
        let mut snapshot = DraftSnapshot::default();
        snapshot.rosters.enemy =
            Roster::from_slots([Some(Unit::new(86, "Garen", "Garen")), None, None, None, None]);
        snapshot.lanes.enemy.set(Lane::Top, "Garen");
        snapshot.analysis.insert(
            AnalysisMode::Draft,
            AnalysisResult::complete("ban Yasuo".to_string()),
        );
        snapshot
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snap.json"));
        assert!(store.load().await.unwrap().is_none());

        store.save(&sample()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.saved_at.is_some());
        assert_eq!(loaded.lanes, sample().lanes);
        assert_eq!(loaded.rosters, sample().rosters);
        assert_eq!(loaded.analysis, sample().analysis);

        // No temp file left behind.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        store.remove().await.unwrap();
        store.remove().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[test]
    fn test_file_uses_fixed_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("draft.rosters"));
        assert!(object.contains_key("draft.lanes"));
        assert!(object.contains_key("draft.analysis"));
    }

    #[test]
    fn test_load_is_lenient() {
        let json = r#"{
            "draft.rosters": "garbage",
            "draft.lanes": {"enemy": {"TOP": "Garen"}},
            "draft.analysis": {
                "draft": {"status": "complete", "text": "ok"},
                "arena": {"status": "complete", "text": "?"},
                "team": {"status": "bogus"}
            },
            "someOtherKey": 1
        }"#;
        let snapshot = DraftSnapshot::from_json(json).unwrap();
        assert!(snapshot.rosters.ally.is_empty());
        assert_eq!(snapshot.lanes.enemy.get(Lane::Top), Some("Garen"));
        assert_eq!(snapshot.analysis.len(), 1);
        assert!(snapshot.analysis.contains_key(&AnalysisMode::Draft));

        assert_eq!(DraftSnapshot::from_json("{}").unwrap(), DraftSnapshot::default());
        assert!(DraftSnapshot::from_json("[1]").is_err());
        assert!(DraftSnapshot::from_json("not json").is_err());
    }

    #[tokio::test]
    async fn test_writer_saves_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let task = SnapshotStore::new(&path).spawn_writer(rx, cancel.clone());

        tx.send_replace(Some(sample()));
        tokio::time::timeout(Duration::from_secs(5), async {
            while !path.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("snapshot never written");

        // The final clear is flushed on shutdown.
        tx.send_replace(None);
        cancel.cancel();
        task.await.unwrap();
        assert!(!path.exists());
    }
}
