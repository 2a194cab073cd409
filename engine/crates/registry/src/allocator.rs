use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::EntityId;

/// Hands out monotonically increasing entity ids. Ids are never recycled,
/// even after the entity they named has been destroyed.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Resume allocation at `next` (used after restoring a snapshot).
    pub fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next.max(1)),
        }
    }

    pub fn allocate(&self) -> EntityId {
        EntityId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Make sure future ids are strictly greater than `id`.
    pub fn observe(&self, id: EntityId) {
        self.next.fetch_max(id.0 + 1, Ordering::Relaxed);
    }

    /// The id the next call to `allocate` will return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
