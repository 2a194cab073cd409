use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::error::BarrierError;

/// Process-wide gate between world mutation and snapshotting.
///
/// Mutating code holds a [`MutationPermit`] for as long as it touches the
/// world. A save takes the gate exclusively: [`begin_save`](Self::begin_save)
/// waits for every outstanding permit to drop and, because the gate is
/// fair, no new permit is granted once a save is queued. Dropping the
/// returned [`SaveGuard`] ends the save.
#[derive(Debug)]
pub struct SaveBarrier {
    gate: Arc<RwLock<()>>,
    saves: Arc<Mutex<()>>,
    saving: Arc<watch::Sender<bool>>,
}

/// Proof that no save is running. Hold it across the whole mutation.
#[derive(Debug)]
pub struct MutationPermit {
    _gate: OwnedRwLockReadGuard<()>,
}

/// Exclusive hold on the world while a snapshot is taken.
#[derive(Debug)]
pub struct SaveGuard {
    _flag: SavingFlag,
    _gate: OwnedRwLockWriteGuard<()>,
    _serial: OwnedMutexGuard<()>,
}

/// Keeps the save flag raised for as long as it lives, including while a
/// save is still waiting for the gate. Lowered on drop, so a save that is
/// cancelled mid-wait leaves the flag down.
#[derive(Debug)]
struct SavingFlag(Arc<watch::Sender<bool>>);

impl SavingFlag {
    fn raise(saving: &Arc<watch::Sender<bool>>) -> Self {
        saving.send_replace(true);
        Self(Arc::clone(saving))
    }
}

impl Drop for SavingFlag {
    fn drop(&mut self) {
        self.0.send_replace(false);
        tracing::debug!("save barrier lowered");
    }
}

impl SaveBarrier {
    pub fn new() -> Self {
        let (saving, _) = watch::channel(false);
        Self {
            gate: Arc::new(RwLock::new(())),
            saves: Arc::new(Mutex::new(())),
            saving: Arc::new(saving),
        }
    }

    pub fn is_saving(&self) -> bool {
        *self.saving.borrow()
    }

    /// Observe the save flag (true while a save is queued or running).
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.saving.subscribe()
    }

    /// Wait until no save is running, then return a permit. Fails if a
    /// save is still running after `timeout`.
    pub async fn await_not_saving(&self, timeout: Duration) -> Result<MutationPermit, BarrierError> {
        match tokio::time::timeout(timeout, Arc::clone(&self.gate).read_owned()).await {
            Ok(guard) => Ok(MutationPermit { _gate: guard }),
            Err(_) => {
                tracing::debug!(?timeout, "gave up waiting for save to finish");
                Err(BarrierError::Timeout(timeout))
            }
        }
    }

    /// Non-blocking permit for callers that would rather skip work than wait.
    pub fn try_enter(&self) -> Option<MutationPermit> {
        Arc::clone(&self.gate)
            .try_read_owned()
            .ok()
            .map(|guard| MutationPermit { _gate: guard })
    }

    /// Raise the save flag and wait for in-flight mutations to drain.
    /// Saves are serialized: a second caller waits for the first to finish.
    pub async fn begin_save(&self) -> SaveGuard {
        let serial = Arc::clone(&self.saves).lock_owned().await;
        let flag = SavingFlag::raise(&self.saving);
        let gate = Arc::clone(&self.gate).write_owned().await;
        tracing::debug!("save barrier raised");
        SaveGuard {
            _flag: flag,
            _gate: gate,
            _serial: serial,
        }
    }
}

impl Default for SaveBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(30);

    #[tokio::test]
    async fn permits_are_shared_when_idle() {
        let barrier = SaveBarrier::new();
        let a = barrier.await_not_saving(SHORT).await.unwrap();
        let b = barrier.await_not_saving(SHORT).await.unwrap();
        assert!(barrier.try_enter().is_some());
        assert!(!barrier.is_saving());
        drop((a, b));
    }

    #[tokio::test]
    async fn mutation_times_out_during_save() {
        let barrier = SaveBarrier::new();
        let save = barrier.begin_save().await;
        assert!(barrier.is_saving());
        assert_eq!(
            barrier.await_not_saving(SHORT).await.unwrap_err(),
            BarrierError::Timeout(SHORT)
        );
        assert!(barrier.try_enter().is_none());

        drop(save);
        assert!(!barrier.is_saving());
        assert!(barrier.await_not_saving(SHORT).await.is_ok());
    }

    #[tokio::test]
    async fn save_waits_for_in_flight_mutation() {
        let barrier = Arc::new(SaveBarrier::new());
        let permit = barrier.await_not_saving(SHORT).await.unwrap();

        let saver = Arc::clone(&barrier);
        let save_task = tokio::spawn(async move {
            let _guard = saver.begin_save().await;
        });

        tokio::time::sleep(SHORT).await;
        // Flag is up but the save cannot proceed while the permit lives.
        assert!(barrier.is_saving());
        assert!(!save_task.is_finished());
        // A queued save blocks new permits.
        assert!(barrier.await_not_saving(SHORT).await.is_err());

        drop(permit);
        save_task.await.unwrap();
        assert!(!barrier.is_saving());
    }

    #[tokio::test]
    async fn subscribers_see_flag_changes() {
        let barrier = SaveBarrier::new();
        let mut rx = barrier.subscribe();
        let save = barrier.begin_save().await;
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        drop(save);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    async fn cancelled_save_lowers_the_flag() {
        let barrier = SaveBarrier::new();
        let permit = barrier.await_not_saving(SHORT).await.unwrap();

        // The save gives up while the permit still blocks it.
        assert!(tokio::time::timeout(SHORT, barrier.begin_save()).await.is_err());
        assert!(!barrier.is_saving());
        drop(permit);

        assert!(barrier.await_not_saving(SHORT).await.is_ok());
        let save = barrier.begin_save().await;
        assert!(barrier.is_saving());
        drop(save);
        assert!(!barrier.is_saving());
    }
}
