//! Per-session turn serialization.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per chat id, created on first use.
///
/// Holding the guard from load through save makes concurrent turns on the
/// same chat run one after another. Different chats never contend.
#[derive(Debug, Default, Clone)]
pub struct SessionLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `chat_id`.
    ///
    /// Cancel-safe: dropping the future while it waits still removes the
    /// map entry if no one else holds it.
    pub async fn acquire(&self, chat_id: Uuid) -> SessionGuard {
        // Declared before the lock future so it drops after the future has
        // released its handle on the mutex.
        let mut pending = SessionGuard {
            chat_id,
            locks: self.locks.clone(),
            guard: None,
        };

        let lock = self
            .locks
            .entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        pending.guard = Some(lock.lock_owned().await);
        pending
    }

    /// Number of chat ids with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one chat, released on drop.
///
/// While `guard` is `None` the holder is still waiting for the mutex.
pub struct SessionGuard {
    chat_id: Uuid,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map still holds the lock: nobody is waiting on this chat.
        self.locks
            .remove_if(&self.chat_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
