//! Per-target serialization of follow-up transactions.
//!
//! A void or pre-auth completion checks history for an earlier approved
//! follow-up of the same target, then appends its own result. Both steps run
//! under the target's lock so two follow-ups of one target cannot both pass
//! the check.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::TxId;

#[derive(Debug, Default)]
pub(crate) struct TargetLocks {
    locks: Mutex<HashMap<TxId, Arc<AsyncMutex<()>>>>,
}

impl TargetLocks {
    /// Wait for exclusive access to `target`. Released when the guard drops.
    pub async fn lock(&self, target: TxId) -> TargetGuard<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(target)
            .or_default()
            .clone();

        TargetGuard {
            locks: self,
            target,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub(crate) struct TargetGuard<'a> {
    locks: &'a TargetLocks,
    target: TxId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TargetGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        // drop the entry once nobody holds or waits on it
        let mut locks = self.locks.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.target)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn entries_are_dropped_after_release() {
        let locks = TargetLocks::default();
        let target = Uuid::new_v4();

        let guard = locks.lock(target).await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn same_target_waits_other_target_does_not() {
        let locks = TargetLocks::default();
        let target = Uuid::new_v4();
        let guard = locks.lock(target).await;

        let other = tokio::time::timeout(Duration::from_millis(10), locks.lock(Uuid::new_v4()));
        assert!(other.await.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(10), locks.lock(target));
        assert!(same.await.is_err());

        drop(guard);
        let same = tokio::time::timeout(Duration::from_millis(10), locks.lock(target));
        assert!(same.await.is_ok());
    }
}
