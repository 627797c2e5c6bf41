use chatrelay_core::UserId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per user, created on demand.
///
/// Tasks for the same user queue behind each other; tasks for different
/// users never contend beyond the brief table lookup. An entry is dropped as
/// soon as no task holds or waits on it, including waiters that were
/// cancelled before they got the lock.
pub struct UserLocks {
    table: Mutex<HashMap<UserId, Slot>>,
}

struct Slot {
    lock: Arc<AsyncMutex<()>>,
    /// Tasks holding or waiting on `lock`.
    users: usize,
}

/// Registration in the lock table; deregisters on drop, whether or not the
/// lock was ever obtained.
struct Ticket<'a> {
    locks: &'a UserLocks,
    user_id: UserId,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.locks.release(self.user_id);
    }
}

/// Exclusive access to one user's session until dropped.
pub struct UserGuard<'a> {
    // Declared first so the mutex unlocks before the ticket deregisters.
    _guard: OwnedMutexGuard<()>,
    ticket: Ticket<'a>,
}

impl UserLocks {
    /// An empty lock table.
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `user_id`.
    ///
    /// Dropping the returned future before it resolves leaves no trace in the
    /// table.
    pub async fn acquire(&self, user_id: UserId) -> UserGuard<'_> {
        let (ticket, lock) = self.register(user_id);
        let guard = lock.lock_owned().await;
        UserGuard {
            _guard: guard,
            ticket,
        }
    }

    /// Number of users with a live lock entry.
    pub fn active(&self) -> usize {
        self.table.lock().len()
    }

    fn register(&self, user_id: UserId) -> (Ticket<'_>, Arc<AsyncMutex<()>>) {
        let mut table = self.table.lock();
        let slot = table.entry(user_id).or_insert_with(|| Slot {
            lock: Arc::new(AsyncMutex::new(())),
            users: 0,
        });
        slot.users += 1;
        let lock = Arc::clone(&slot.lock);
        (
            Ticket {
                locks: self,
                user_id,
            },
            lock,
        )
    }

    fn release(&self, user_id: UserId) {
        let mut table = self.table.lock();
        if let Some(slot) = table.get_mut(&user_id) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                table.remove(&user_id);
            }
        }
    }
}

impl Default for UserLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl UserGuard<'_> {
    /// The user this guard serializes.
    pub fn user_id(&self) -> UserId {
        self.ticket.user_id
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_pruned_after_release() {
        let locks = UserLocks::new();
        {
            let guard = locks.acquire(UserId(1)).await;
            assert_eq!(guard.user_id(), UserId(1));
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_same_user_waits() {
        let locks = Arc::new(UserLocks::new());
        let first = locks.acquire(UserId(1)).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire(UserId(1)).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_other_users_do_not_wait() {
        let locks = UserLocks::new();
        let _first = locks.acquire(UserId(1)).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire(UserId(2))).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_aborted_waiter_is_pruned() {
        let locks = Arc::new(UserLocks::new());
        let holder = locks.acquire(UserId(1)).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire(UserId(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        drop(holder);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_waiter_dropped_after_holder_release_is_pruned() {
        let locks = UserLocks::new();
        let holder = locks.acquire(UserId(2)).await;

        let mut pending = Box::pin(locks.acquire(UserId(2)));
        tokio::select! {
            biased;
            _ = &mut pending => panic!("lock should be held"),
            () = tokio::task::yield_now() => {}
        }
        assert_eq!(locks.active(), 1);

        drop(holder);
        assert_eq!(locks.active(), 1);
        drop(pending);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_acquire_is_pruned() {
        let locks = UserLocks::new();
        let holder = locks.acquire(UserId(3)).await;
        let attempt =
            tokio::time::timeout(Duration::from_millis(20), locks.acquire(UserId(3))).await;
        assert!(attempt.is_err());
        drop(holder);
        assert_eq!(locks.active(), 0);
    }
}
