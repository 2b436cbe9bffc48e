//! League domain and the shared application state handed to every route.

pub mod cost;
pub mod league;
pub mod scoring;
mod sse;
/// Sync phases and their transitions.
pub mod sync_machine;

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::{config::AppConfig, services::sync_service::SyncHandle};

pub use self::sse::SseHub;
use self::sync_machine::SyncPhase;

/// State shared by every handler.
pub type SharedState = Arc<AppState>;
/// Longest wait for the sync controller to answer a command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const SSE_CAPACITY: usize = 32;

/// Central application state: configuration, the sync controller handle and
/// the SSE fan-out.
pub struct AppState {
    config: AppConfig,
    sync: SyncHandle,
    sse: SseHub,
    degraded: watch::Sender<bool>,
    command_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until the storage supervisor
    /// reports a healthy backend.
    pub fn new(config: AppConfig, sync: SyncHandle) -> SharedState {
        Self::with_command_timeout(config, sync, Some(DEFAULT_COMMAND_TIMEOUT))
    }

    /// Same as [`AppState::new`] with a custom limit on how long a route waits
    /// for the sync controller. `None` waits forever.
    pub fn with_command_timeout(
        config: AppConfig,
        sync: SyncHandle,
        command_timeout: Option<Duration>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            sync,
            sse: SseHub::new(SSE_CAPACITY),
            degraded: degraded_tx,
            command_timeout,
        })
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Handle to the controller owning the league.
    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    /// Broadcast hub used for the league SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Command reply timeout, if enabled.
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    /// Degraded when the storage backend is unreachable or the league is not
    /// in sync with the shared document.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow() || self.sync.status().phase != SyncPhase::Synced
    }

    /// Subscribe to storage connectivity updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the storage connectivity flag, notifying watchers only on change.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
