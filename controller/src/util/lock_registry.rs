//! Per-key mutual exclusion for Allocation processing (§4.2).
//!
//! Grounded on `pkg/controller/allocationsLock/lock.go`'s `sync.Map` of
//! `(namespace,name) -> lock`; here a `tokio::sync::Mutex` per key guarded by
//! an outer `std::sync::Mutex` on the map itself, since acquiring a key's
//! lock and inserting a fresh one into the map are different concerns.

use plenuslb_shared::plenuslb::retry::Backoff;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Identifies the call site that acquired a lock, for diagnostics only.
pub type HolderId = &'static str;

pub struct LockRegistry {
    keys: Mutex<HashMap<(String, String), Arc<AsyncMutex<()>>>>,
    backoff: Backoff,
}

/// An acquired per-(namespace,name) lock. Dropping it releases the lock.
pub struct AllocationLock {
    _guard: OwnedMutexGuard<()>,
    pub holder: HolderId,
}

impl LockRegistry {
    pub fn new() -> Self {
        LockRegistry {
            keys: Mutex::new(HashMap::new()),
            backoff: Backoff::LOCK_ACQUISITION,
        }
    }

    fn entry(&self, namespace: &str, name: &str) -> Arc<AsyncMutex<()>> {
        let mut guard = self.keys.lock().unwrap();
        guard
            .entry((namespace.to_string(), name.to_string()))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquires the lock for `(namespace, name)`, retrying with the default
    /// lock-acquisition back-off if immediately contended, up to
    /// `max_steps`. Returns `None` if the lock is still held after
    /// exhausting the schedule.
    pub async fn acquire(
        &self,
        namespace: &str,
        name: &str,
        holder: HolderId,
    ) -> Option<AllocationLock> {
        let mutex = self.entry(namespace, name);
        if let Ok(guard) = mutex.clone().try_lock_owned() {
            return Some(AllocationLock {
                _guard: guard,
                holder,
            });
        }
        for (_step, delay) in self.backoff.steps() {
            tokio::time::sleep(delay).await;
            if let Ok(guard) = mutex.clone().try_lock_owned() {
                return Some(AllocationLock {
                    _guard: guard,
                    holder,
                });
            }
        }
        None
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_for_first_to_drop() {
        let registry = LockRegistry::new();
        let first = registry.acquire("ns", "name", "test-a").await.unwrap();
        let registry = Arc::new(registry);
        let registry2 = registry.clone();
        let handle = tokio::spawn(async move { registry2.acquire("ns", "name", "test-b").await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(first);
        let second = handle.await.unwrap();
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let registry = LockRegistry::new();
        let a = registry.acquire("ns", "a", "test").await;
        let b = registry.acquire("ns", "b", "test").await;
        assert!(a.is_some());
        assert!(b.is_some());
    }
}
