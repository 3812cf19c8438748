//! Authoritative in-memory state for every item
//!
//! The store pairs a map of states with a per-item operation lock. The map
//! lock is held only for single reads and writes; the operation lock is what
//! makes an orchestrator call's check-then-act sequence atomic for one item
//! while leaving other items free to proceed.

use crate::types::{DownloadState, ItemId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

type LockTable = Arc<std::sync::Mutex<HashMap<ItemId, Arc<Mutex<()>>>>>;

/// Thread-safe map from item identity to [`DownloadState`]
#[derive(Default)]
pub struct StateStore {
    entries: RwLock<HashMap<ItemId, DownloadState>>,
    /// Operation locks of items with an operation running or waiting
    item_locks: LockTable,
}

/// Held operation lock for one item
///
/// Dropping the guard releases the lock and forgets it once no other
/// operation holds or waits for it.
pub struct ItemGuard {
    guard: Option<OwnedMutexGuard<()>>,
    id: ItemId,
    locks: LockTable,
}

impl Drop for ItemGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

impl StateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of an item (`None` when absent)
    pub async fn get(&self, id: &ItemId) -> DownloadState {
        self.entries
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the state of an item
    ///
    /// Setting [`DownloadState::None`] removes the entry, since `None` is the
    /// implicit state of every unknown item.
    pub async fn set(&self, id: &ItemId, state: DownloadState) {
        let mut entries = self.entries.write().await;
        if state.is_none() {
            entries.remove(id);
        } else {
            entries.insert(id.clone(), state);
        }
    }

    /// Record transfer progress for an item that is still downloading
    ///
    /// Returns the stored value, or `None` if the item has left the
    /// downloading state (a late report from a transfer that was just
    /// paused or cancelled must not resurrect it).
    pub async fn update_progress(&self, id: &ItemId, progress: f64) -> Option<f64> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(id) {
            Some(DownloadState::Downloading { progress: stored }) => {
                *stored = progress.clamp(0.0, 1.0);
                Some(*stored)
            }
            _ => None,
        }
    }

    /// Acquire the operation lock for one item
    ///
    /// Hold the guard for the whole of a state-machine operation. Locks for
    /// different items are independent.
    pub async fn lock_item(&self, id: &ItemId) -> ItemGuard {
        let lock = {
            let mut locks = self
                .item_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks.entry(id.clone()).or_default().clone()
        };
        ItemGuard {
            guard: Some(lock.lock_owned().await),
            id: id.clone(),
            locks: self.item_locks.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.item_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Copy of every stored entry
    pub async fn snapshot(&self) -> Vec<(ItemId, DownloadState)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect()
    }

    /// Number of stored (non-`None`) entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no entries are stored
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
