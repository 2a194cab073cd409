use registry::EntityId;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Full world dump: every registered entity plus what is needed to resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot<T> {
    pub version: u32,
    pub tick: u64,
    /// Next id the allocator would hand out when the dump was taken.
    pub next_id: u64,
    pub start_area: EntityId,
    pub entities: Vec<T>,
}

impl<T> WorldSnapshot<T> {
    pub fn new(tick: u64, next_id: u64, start_area: EntityId, entities: Vec<T>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            tick,
            next_id,
            start_area,
            entities,
        }
    }

    /// Reject dumps written by an incompatible format revision.
    pub fn check_version(&self) -> Result<(), PersistenceError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                got: self.version,
            });
        }
        if !self.start_area.is_valid() {
            return Err(PersistenceError::Corrupt("snapshot has no start area".into()));
        }
        Ok(())
    }
}
