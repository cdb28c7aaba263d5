pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::TimerEntity;
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for timer aggregates.
///
/// Mutations go through [`TimerStore::load_for_update`], which takes the
/// timer's update-mode lock before reading, so concurrent transactions on the
/// same timer id are linearized by the backend.
pub trait TimerStore: Send + Sync {
    /// Persist a freshly built aggregate. Fails if the id already exists.
    fn create(&self, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Read the current aggregate without locking it.
    fn load(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TimerEntity>>>;
    /// Lock the timer row and read the current aggregate for mutation.
    ///
    /// Returns `None` when the timer does not exist. The lock is held until
    /// the returned lease is committed, deleted, or dropped (abort).
    fn load_for_update(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Box<dyn TimerLease>>>>;
    /// Verify the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// A locked read of one timer aggregate, scoped to a single transaction.
///
/// Dropping the lease without calling [`TimerLease::commit`] aborts the
/// transaction: the stored aggregate is left untouched.
pub trait TimerLease: Send {
    /// The aggregate as read under the lock.
    fn entity(&self) -> &TimerEntity;
    /// Commit the mutated aggregate and release the lock.
    fn commit(self: Box<Self>, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete the timer and all of its seats (cascade), releasing the lock.
    fn delete(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>>;
}

impl std::fmt::Debug for dyn TimerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerLease").finish_non_exhaustive()
    }
}
