pub mod barrier;
pub mod error;
pub mod manager;
pub mod snapshot;

pub use barrier::{MutationPermit, SaveBarrier, SaveGuard};
pub use error::{BarrierError, PersistenceError};
pub use manager::SnapshotManager;
pub use snapshot::{WorldSnapshot, SNAPSHOT_VERSION};
