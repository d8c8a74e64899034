use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Per-account mutual exclusion for mutations.
///
/// One async mutex per alias, created on first use and forgotten once no
/// task holds or waits on it. Different aliases never contend; the map lock
/// is only held to look up, insert or evict a handle.
#[derive(Default)]
pub struct AccountLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

/// Exclusive access to one alias, released on drop.
pub struct AccountGuard<'a> {
    locks: &'a AccountLocks,
    alias: String,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `alias`.
    pub async fn acquire(&self, alias: &str) -> AccountGuard<'_> {
        let lock = self.handle(alias);
        let guard = match lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(account = alias, "waiting for account lock");
                lock.clone().lock_owned().await
            }
        };
        AccountGuard {
            locks: self,
            alias: alias.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    /// True if a mutation on `alias` is in flight.
    pub fn is_locked(&self, alias: &str) -> bool {
        read_unpoisoned(&self.locks, "account_locks")
            .get(alias)
            .is_some_and(|l| l.try_lock().is_err())
    }

    /// Number of aliases with a live lock handle.
    pub fn tracked(&self) -> usize {
        read_unpoisoned(&self.locks, "account_locks").len()
    }

    fn handle(&self, alias: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = read_unpoisoned(&self.locks, "account_locks").get(alias) {
            return lock.clone();
        }
        write_unpoisoned(&self.locks, "account_locks")
            .entry(alias.to_string())
            .or_default()
            .clone()
    }
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = write_unpoisoned(&self.locks.locks, "account_locks");
        // Handles are only cloned under the map lock, so the map's copy and
        // ours being the only two means nobody is waiting.
        let idle = map
            .get(&self.alias)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2);
        if idle {
            map.remove(&self.alias);
        }
    }
}

pub(crate) fn read_unpoisoned<'a, T>(
    lock: &'a RwLock<T>,
    lock_name: &'static str,
) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                lock = lock_name,
                "rwlock poisoned; continuing with inner state"
            );
            poisoned.into_inner()
        }
    }
}

pub(crate) fn write_unpoisoned<'a, T>(
    lock: &'a RwLock<T>,
    lock_name: &'static str,
) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                lock = lock_name,
                "rwlock poisoned; continuing with inner state"
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_alias_is_exclusive() {
        let locks = AccountLocks::new();
        let guard = locks.acquire("alice").await;
        assert!(locks.is_locked("alice"));

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire("alice")).await;
        assert!(blocked.is_err());

        drop(guard);
        assert!(!locks.is_locked("alice"));
        let _again = locks.acquire("alice").await;
    }

    #[tokio::test]
    async fn idle_handles_are_evicted() {
        let locks = AccountLocks::new();
        for i in 0..100 {
            let _guard = locks.acquire(&format!("user-{i}")).await;
        }
        assert_eq!(locks.tracked(), 0);

        let held = locks.acquire("alice").await;
        assert_eq!(locks.tracked(), 1);
        drop(held);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn handle_survives_while_someone_waits() {
        let locks = Arc::new(AccountLocks::new());
        let first = locks.acquire("alice").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("alice").await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(locks.tracked(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn different_aliases_do_not_contend() {
        let locks = AccountLocks::new();
        let _a = locks.acquire("alice").await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire("bob")).await;
        assert!(b.is_ok());
    }
}
