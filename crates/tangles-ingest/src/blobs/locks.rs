//! Per-key write locks shared by the blob backends
//!
//! An upload holds the lock for its key from the existence check until its
//! sink is committed or dropped. A second upload of the same key waits for
//! that outcome and then re-checks existence, so it only reports
//! `AlreadyExists` once the object is really stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::BlobError;

type LockTable = Arc<Mutex<HashMap<String, Arc<Semaphore>>>>;

#[derive(Clone, Default)]
pub(crate) struct KeyLocks {
    table: LockTable,
}

impl KeyLocks {
    /// Wait until no other upload holds `key`, then hold it
    pub(crate) async fn acquire(&self, key: &str) -> Result<KeyGuard, BlobError> {
        let semaphore = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                table
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Semaphore::new(1))),
            )
        };

        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| BlobError::Backend(format!("write lock for '{key}' was closed")))?;

        Ok(KeyGuard {
            key: key.to_string(),
            table: Arc::clone(&self.table),
            permit: Some(permit),
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Holds a key until dropped
pub(crate) struct KeyGuard {
    key: String,
    table: LockTable,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        drop(self.permit.take());

        // Waiters hold their own reference; only the table's is left when idle
        if table.get(&self.key).is_some_and(|s| Arc::strong_count(s) == 1) {
            table.remove(&self.key);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_second_acquire_waits_for_release() {
        let locks = KeyLocks::default();
        let first = locks.acquire("a.png").await.unwrap();

        let waiting = tokio::spawn({
            let locks = locks.clone();
            async move { locks.acquire("a.png").await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyLocks::default();
        let _a = locks.acquire("a.png").await.unwrap();
        let b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("b.png")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_keys_are_removed() {
        let locks = KeyLocks::default();
        drop(locks.acquire("a.png").await.unwrap());
        assert_eq!(locks.len(), 0);
    }
}
