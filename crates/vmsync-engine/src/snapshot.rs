//! Last-seen VM id list for the cheap "anything changed?" check

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use vmsync_types::VmId;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    taken_at: DateTime<Utc>,
    vm_ids: BTreeSet<VmId>,
}

/// JSON file holding the VM ids seen by the last completed run
#[derive(Debug, Clone)]
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

    /// Saved id set, or `None` if there is no usable snapshot.
    pub fn load(&self) -> SyncResult<Option<BTreeSet<VmId>>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Snapshot>(&raw) {
            Ok(snapshot) => Ok(Some(snapshot.vm_ids)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable snapshot");
                Ok(None)
            }
        }
    }

    /// Replace the snapshot. Written to a sibling file and renamed into place.
    pub fn save(&self, ids: &BTreeSet<VmId>) -> SyncResult<()> {
        let snapshot = Snapshot {
            taken_at: Utc::now(),
            vm_ids: ids.clone(),
        };
        let body = serde_json::to_vec_pretty(&snapshot)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, body)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| SyncError::Snapshot(format!("{}: {}", self.path.display(), e)))?;

        tracing::debug!(path = %self.path.display(), vms = ids.len(), "Snapshot saved");
        Ok(())
    }

    /// True when `current` differs from the saved set (or nothing was saved).
    pub fn has_changed(&self, current: &BTreeSet<VmId>) -> SyncResult<bool> {
        Ok(self.load()?.as_ref() != Some(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> BTreeSet<VmId> {
        raw.iter().map(|id| VmId::new(*id)).collect()
    }

    #[test]
    fn test_missing_snapshot_counts_as_changed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("vms.json"));

        assert_eq!(store.load().unwrap(), None);
        assert!(store.has_changed(&ids(&["vm-1"])).unwrap());
    }

    #[test]
    fn test_set_comparison_ignores_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("vms.json"));

        store.save(&ids(&["vm-2", "vm-1"])).unwrap();
        assert!(!store.has_changed(&ids(&["vm-1", "vm-2"])).unwrap());
        assert!(store.has_changed(&ids(&["vm-1", "vm-3"])).unwrap());
        assert!(!dir.path().join("vms.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_snapshot_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vms.json");
        fs::write(&path, "not json").unwrap();

        let store = SnapshotStore::new(&path);
        assert_eq!(store.load().unwrap(), None);
    }
}
