/// Injectable time source.
pub mod clock;
/// Room registry for timer broadcast groups.
pub mod rooms;
/// Chess-clock state machine and runtime timer model.
pub mod timer;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::timer_store::TimerStore,
    error::ServiceError,
    state::{
        clock::{Clock, SystemClock},
        rooms::RoomRegistry,
    },
};

/// Shared handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state: the installed store, the room registry, and
/// the clock capability. Per-connection session state lives with each socket
/// task, not here.
pub struct AppState {
    timer_store: RwLock<Option<Arc<dyn TimerStore>>>,
    rooms: RoomRegistry,
    clock: Arc<dyn Clock>,
    config: AppConfig,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply. The application starts in degraded mode until a storage
    /// backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] but with an explicit clock, used by tests to
    /// control elapsed-time math deterministically.
    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            timer_store: RwLock::new(None),
            rooms: RoomRegistry::new(),
            clock,
            config,
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current timer store, if one is installed.
    pub async fn timer_store(&self) -> Option<Arc<dyn TimerStore>> {
        let guard = self.timer_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the timer store or fail with a degraded-mode error.
    pub async fn require_timer_store(&self) -> Result<Arc<dyn TimerStore>, ServiceError> {
        self.timer_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new timer store implementation and leave degraded mode.
    pub async fn install_timer_store(&self, store: Arc<dyn TimerStore>) {
        {
            let mut guard = self.timer_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current timer store and enter degraded mode.
    pub async fn clear_timer_store(&self) {
        {
            let mut guard = self.timer_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.timer_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of timer broadcast groups.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Shared time source; one sample per transaction.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Update and broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
