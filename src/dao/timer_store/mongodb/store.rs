use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::{
    sync::{Mutex, OwnedMutexGuard, RwLock},
    time::{sleep, timeout},
};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
    models::{MongoTimerDocument, doc_id},
};
use crate::dao::{
    models::TimerEntity,
    storage::{StorageError, StorageResult},
    timer_store::{TimerLease, TimerStore},
};

const TIMER_COLLECTION_NAME: &str = "timers";

const CONNECT_MAX_ATTEMPTS: u32 = 10;
const CONNECT_INITIAL_DELAY: Duration = Duration::from_millis(250);
const CONNECT_MAX_DELAY: Duration = Duration::from_secs(5);

/// MongoDB-backed [`TimerStore`].
///
/// Durability comes from the timer collection; the update-mode serialization
/// the lease contract requires comes from an in-process per-timer lock table,
/// so this backend assumes a single server instance owns the database.
#[derive(Clone)]
pub struct MongoTimerStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    lock_timeout: Duration,
}

struct MongoState {
    database: Database,
}

impl MongoTimerStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig, lock_timeout: Duration) -> MongoResult<Self> {
        let client = Client::with_options(config.options.clone())
            .map_err(|source| MongoDaoError::ClientConstruction { source })?;
        let database = client.database(&config.database_name);

        ping_until_ready(&database).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { database }),
                locks: DashMap::new(),
                lock_timeout,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"event_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("timer_event_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: TIMER_COLLECTION_NAME,
                index: "event_id",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoTimerDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoTimerDocument>(TIMER_COLLECTION_NAME)
    }

    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.inner.state.read().await;
            guard.database.clone()
        };
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
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

    async fn find_timer(&self, id: Uuid) -> MongoResult<Option<TimerEntity>> {
        let collection = self.collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadTimer { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn save_timer(&self, timer: TimerEntity) -> MongoResult<()> {
        let id = timer.id;
        let document: MongoTimerDocument = timer.into();
        let collection = self.collection().await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveTimer { id, source })?;
        Ok(())
    }

    async fn delete_timer(&self, id: Uuid) -> MongoResult<()> {
        let collection = self.collection().await;
        collection
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteTimer { id, source })?;
        Ok(())
    }
}

/// Ping with exponential backoff until the deployment answers.
async fn ping_until_ready(database: &Database) -> MongoResult<()> {
    let mut attempts = 0;
    let mut delay = CONNECT_INITIAL_DELAY;

    loop {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => return Ok(()),
            Err(err) => {
                attempts += 1;
                if attempts >= CONNECT_MAX_ATTEMPTS {
                    return Err(MongoDaoError::InitialPing {
                        attempts,
                        source: err,
                    });
                }
                sleep(delay).await;
                delay = (delay * 2).min(CONNECT_MAX_DELAY);
            }
        }
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

struct MongoLease {
    store: MongoTimerStore,
    id: Uuid,
    snapshot: TimerEntity,
    _guard: OwnedMutexGuard<()>,
}

impl TimerLease for MongoLease {
    fn entity(&self) -> &TimerEntity {
        &self.snapshot
    }

    fn commit(self: Box<Self>, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move {
            self.store.save_timer(timer).await.map_err(Into::into)
            // _guard drops here, releasing the row lock.
        })
    }

    fn delete(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move {
            self.store.delete_timer(self.id).await?;
            self.store.inner.locks.remove(&self.id);
            Ok(())
        })
    }
}

impl TimerStore for MongoTimerStore {
    fn create(&self, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = timer.id;
            let document: MongoTimerDocument = timer.into();
            let collection = store.collection().await;
            collection.insert_one(&document).await.map_err(|source| {
                if is_duplicate_key(&source) {
                    StorageError::AlreadyExists { id }
                } else {
                    MongoDaoError::CreateTimer { id, source }.into()
                }
            })?;
            Ok(())
        })
    }

    fn load(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TimerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_timer(id).await.map_err(Into::into) })
    }

    fn load_for_update(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Box<dyn TimerLease>>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.acquire_row_lock(id).await?;
            let Some(snapshot) = store.find_timer(id).await? else {
                return Ok(None);
            };
            Ok(Some(Box::new(MongoLease {
                store,
                id,
                snapshot,
                _guard: guard,
            }) as Box<dyn TimerLease>))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
