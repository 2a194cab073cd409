use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistenceError;
use crate::snapshot::WorldSnapshot;

const LATEST: &str = "latest.bin";

/// Writes and reads world snapshots in one directory.
pub struct SnapshotManager {
    save_dir: PathBuf,
    /// How many numbered snapshots to keep besides `latest.bin` (0 = all).
    keep: usize,
}

impl SnapshotManager {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
            keep: 0,
        }
    }

    pub fn with_retention(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Save a snapshot as `snapshot_tick_<n>.bin` and refresh `latest.bin`.
    /// Both files are written to a temp name first and renamed into place.
    pub fn save_to_disk<T: Serialize>(&self, snapshot: &WorldSnapshot<T>) -> Result<PathBuf, PersistenceError> {
        std::fs::create_dir_all(&self.save_dir)?;

        let filename = format!("snapshot_tick_{}.bin", snapshot.tick);
        let path = self.save_dir.join(&filename);
        let bytes = bincode::serialize(snapshot)?;

        write_atomic(&self.save_dir.join(format!("{}.tmp", filename)), &path, &bytes)?;
        write_atomic(
            &self.save_dir.join(format!("{}.tmp", LATEST)),
            &self.save_dir.join(LATEST),
            &bytes,
        )?;

        tracing::info!(
            tick = snapshot.tick,
            entities = snapshot.entities.len(),
            bytes = bytes.len(),
            path = %path.display(),
            "Snapshot saved"
        );

        if self.keep > 0 {
            self.prune()?;
        }
        Ok(path)
    }

    pub fn load_latest<T: DeserializeOwned>(&self) -> Result<WorldSnapshot<T>, PersistenceError> {
        self.load_from_path(&self.save_dir.join(LATEST))
    }

    pub fn load_from_path<T: DeserializeOwned>(&self, path: &Path) -> Result<WorldSnapshot<T>, PersistenceError> {
        let bytes = std::fs::read(path)?;
        let snapshot: WorldSnapshot<T> = bincode::deserialize(&bytes)?;
        snapshot.check_version()?;
        tracing::info!(
            tick = snapshot.tick,
            version = snapshot.version,
            entities = snapshot.entities.len(),
            path = %path.display(),
            "Snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn has_latest(&self) -> bool {
        self.save_dir.join(LATEST).exists()
    }

    /// Numbered snapshots on disk, oldest tick first.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>, PersistenceError> {
        let mut found = Vec::new();
        if !self.save_dir.exists() {
            return Ok(found);
        }
        for entry in std::fs::read_dir(&self.save_dir)? {
            let path = entry?.path();
            let tick = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("snapshot_tick_"))
                .and_then(|n| n.strip_suffix(".bin"))
                .and_then(|n| n.parse::<u64>().ok());
            if let Some(tick) = tick {
                found.push((tick, path));
            }
        }
        found.sort_by_key(|(tick, _)| *tick);
        Ok(found)
    }

    fn prune(&self) -> Result<(), PersistenceError> {
        let all = self.list()?;
        let excess = all.len().saturating_sub(self.keep);
        for (tick, path) in all.into_iter().take(excess) {
            std::fs::remove_file(&path)?;
            tracing::debug!(tick, path = %path.display(), "old snapshot pruned");
        }
        Ok(())
    }
}

fn write_atomic(tmp: &Path, dest: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    std::fs::write(tmp, bytes)?;
    std::fs::rename(tmp, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry::EntityId;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Rock {
        id: u64,
        name: String,
    }

    fn snap(tick: u64) -> WorldSnapshot<Rock> {
        WorldSnapshot::new(
            tick,
            3,
            EntityId(1),
            vec![Rock { id: 2, name: "pebble".into() }],
        )
    }

    #[test]
    fn save_and_load_latest() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path());
        assert!(!mgr.has_latest());

        let path = mgr.save_to_disk(&snap(42)).unwrap();
        assert!(path.exists());
        assert!(mgr.has_latest());

        let loaded: WorldSnapshot<Rock> = mgr.load_latest().unwrap();
        assert_eq!(loaded.tick, 42);
        assert_eq!(loaded.next_id, 3);
        assert_eq!(loaded.entities[0].name, "pebble");
    }

    #[test]
    fn load_nonexistent_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path().join("missing"));
        assert!(matches!(mgr.load_latest::<Rock>(), Err(PersistenceError::Io(_))));
    }

    #[test]
    fn latest_tracks_most_recent_save() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path());
        mgr.save_to_disk(&snap(100)).unwrap();
        mgr.save_to_disk(&snap(200)).unwrap();
        let loaded: WorldSnapshot<Rock> = mgr.load_latest().unwrap();
        assert_eq!(loaded.tick, 200);
        assert_eq!(mgr.list().unwrap().len(), 2);
    }

    #[test]
    fn retention_prunes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path()).with_retention(2);
        for tick in [10, 20, 30] {
            mgr.save_to_disk(&snap(tick)).unwrap();
        }
        let ticks: Vec<u64> = mgr.list().unwrap().into_iter().map(|(t, _)| t).collect();
        assert_eq!(ticks, vec![20, 30]);
        assert!(mgr.has_latest());
    }

    #[test]
    fn garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LATEST), b"not a snapshot").unwrap();
        let mgr = SnapshotManager::new(dir.path());
        assert!(mgr.load_latest::<Rock>().is_err());
    }
}
