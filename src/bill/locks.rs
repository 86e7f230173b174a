use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Keyed async mutex serializing mutations of one bill
///
/// Work on different bills never waits on each other. Entries are dropped
/// once no task holds or waits for them.
#[derive(Clone, Default)]
pub struct BillLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl BillLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `bill_id`
    pub async fn acquire(&self, bill_id: &str) -> BillLockGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(bill_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        let guard = lock.clone().lock_owned().await;
        BillLockGuard {
            bill_id: bill_id.to_string(),
            guard: Some(guard),
            lock,
            locks: self.locks.clone(),
        }
    }
}

pub struct BillLockGuard {
    bill_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<tokio::sync::Mutex<()>>,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for BillLockGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this guard still reference the lock: nobody is waiting
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.bill_id);
        }
    }
}
