//! In-memory timer store used by tests and as the fallback backend.
//!
//! Committed aggregates live in a plain concurrent map, so reads never wait.
//! Update-mode serialization comes from a separate per-timer async mutex,
//! which plays the role of the row-level update lock: `load_for_update` must
//! win it (within the configured timeout) before reading, so concurrent
//! mutations on one timer serialize exactly like they would on a locking
//! database row.

use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    time::timeout,
};
use uuid::Uuid;

use super::{TimerLease, TimerStore};
use crate::dao::{
    models::TimerEntity,
    storage::{StorageError, StorageResult},
};

/// In-memory [`TimerStore`] backend.
#[derive(Clone)]
pub struct MemoryTimerStore {
    inner: Arc<Inner>,
}

struct Inner {
    timers: DashMap<Uuid, TimerEntity>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    lock_timeout: Duration,
}

impl MemoryTimerStore {
    /// Build an empty store whose update locks give up after `lock_timeout`.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                timers: DashMap::new(),
                locks: DashMap::new(),
                lock_timeout,
            }),
        }
    }

    async fn acquire_row_lock(&self, id: Uuid) -> StorageResult<OwnedMutexGuard<()>> {
        let mutex = self
            .inner
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        timeout(self.inner.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| StorageError::LockTimeout { id })
    }
}

struct MemoryLease {
    inner: Arc<Inner>,
    id: Uuid,
    snapshot: TimerEntity,
    _guard: OwnedMutexGuard<()>,
}

impl TimerLease for MemoryLease {
    fn entity(&self) -> &TimerEntity {
        &self.snapshot
    }

    fn commit(self: Box<Self>, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move {
            self.inner.timers.insert(self.id, timer);
            Ok(())
            // _guard drops here, releasing the row lock.
        })
    }

    fn delete(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move {
            self.inner.timers.remove(&self.id);
            self.inner.locks.remove(&self.id);
            Ok(())
        })
    }
}

impl TimerStore for MemoryTimerStore {
    fn create(&self, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            match store.inner.timers.entry(timer.id) {
                Entry::Occupied(_) => Err(StorageError::AlreadyExists { id: timer.id }),
                Entry::Vacant(vacant) => {
                    vacant.insert(timer);
                    Ok(())
                }
            }
        })
    }

    fn load(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TimerEntity>>> {
        let store = self.clone();
        // Reads see the last committed aggregate and never touch the row lock.
        Box::pin(async move { Ok(store.inner.timers.get(&id).map(|entry| entry.value().clone())) })
    }

    fn load_for_update(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Box<dyn TimerLease>>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.acquire_row_lock(id).await?;
            let Some(snapshot) = store.inner.timers.get(&id).map(|entry| entry.value().clone())
            else {
                // Deleted before the lock was won; drop the stale lock entry.
                store.inner.locks.remove(&id);
                return Ok(None);
            };
            Ok(Some(Box::new(MemoryLease {
                inner: store.inner.clone(),
                id,
                snapshot,
                _guard: guard,
            }) as Box<dyn TimerLease>))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}
