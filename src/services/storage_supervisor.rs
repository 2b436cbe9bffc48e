use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{document_store::DocumentStore, storage::StorageError},
    error::ServiceError,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Timing knobs of [`run_with`].
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTiming {
    /// First reconnect delay.
    pub initial_delay: Duration,
    /// Upper bound of the reconnect delay.
    pub max_delay: Duration,
    /// Time between health checks.
    pub health_poll_interval: Duration,
    /// Reconnect attempts before starting over.
    pub max_reconnect_attempts: u32,
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_DELAY,
            max_delay: MAX_DELAY,
            health_poll_interval: HEALTH_POLL_INTERVAL,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Connect to the storage backend, hand it to the sync controller and keep
/// watching its health, flipping degraded mode when it becomes unreachable.
pub async fn run<F, Fut>(state: SharedState, connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn DocumentStore>, StorageError>> + Send,
{
    run_with(state, connect, SupervisorTiming::default()).await
}

/// [`run`] with explicit timings. Returns once the sync controller has stopped.
pub async fn run_with<F, Fut>(state: SharedState, mut connect: F, timing: SupervisorTiming)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn DocumentStore>, StorageError>> + Send,
{
    let mut delay = timing.initial_delay;

    loop {
        match connect().await {
            Ok(store) => {
                if controller_stopped(state.sync().install_store(store.clone()).await) {
                    return;
                }
                state.update_degraded(false);
                info!("storage connection established; leaving degraded mode");
                delay = timing.initial_delay;

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            if *state.degraded_watcher().borrow() {
                                info!("storage healthy again; leaving degraded mode");
                                state.update_degraded(false);
                                if controller_stopped(state.sync().report_store_recovered().await)
                                {
                                    return;
                                }
                            }
                            sleep(timing.health_poll_interval).await;
                        }
                        Err(health_err) => {
                            let mut attempt = 0;
                            let mut reconnect_delay = timing.initial_delay;
                            let mut reconnected = false;

                            while attempt < timing.max_reconnect_attempts {
                                match store.try_reconnect().await {
                                    Ok(()) => {
                                        info!(
                                            "storage reconnection succeeded after health check failure"
                                        );
                                        reconnected = true;
                                        break;
                                    }
                                    Err(reconnect_err) => {
                                        if attempt == 0 {
                                            warn!(
                                                attempt, error = %reconnect_err,
                                                "storage reconnect first attempt failed; entering in degraded mode"
                                            );
                                            state.update_degraded(true);
                                            if controller_stopped(
                                                state
                                                    .sync()
                                                    .report_store_failure(health_err.to_string())
                                                    .await,
                                            ) {
                                                return;
                                            }
                                        } else {
                                            warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                                        };
                                        attempt += 1;
                                        sleep(reconnect_delay).await;
                                        reconnect_delay =
                                            (reconnect_delay * 2).min(timing.max_delay);
                                    }
                                }
                            }

                            if reconnected {
                                if *state.degraded_watcher().borrow() {
                                    state.update_degraded(false);
                                    if controller_stopped(
                                        state.sync().report_store_recovered().await,
                                    ) {
                                        return;
                                    }
                                }
                                sleep(timing.health_poll_interval).await;
                                continue;
                            } else {
                                warn!(
                                    "exhausted storage reconnect attempts; staying in degraded mode"
                                );
                                break;
                            }
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(timing.max_delay);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(timing.max_delay);
            }
        }
    }
}

fn controller_stopped(result: Result<(), ServiceError>) -> bool {
    if let Err(err) = result {
        info!(error = %err, "sync controller gone; stopping storage supervisor");
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::timeout;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::document_store::memory::MemoryDocumentStore,
        services::sync_service::{Backoff, SyncController},
        state::{AppState, sync_machine::SyncPhase},
    };

    fn fast() -> SupervisorTiming {
        SupervisorTiming {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            health_poll_interval: Duration::from_millis(10),
            max_reconnect_attempts: 2,
        }
    }

    fn app_state() -> SharedState {
        let config = AppConfig::default();
        let settings = config.sync_settings().with_backoff(Backoff {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(40),
        });
        AppState::new(config, SyncController::spawn(settings).unwrap())
    }

    async fn wait_for_phase(state: &SharedState, phase: SyncPhase) {
        let mut status = state.sync().watch_status();
        timeout(Duration::from_secs(2), status.wait_for(|s| s.phase == phase))
            .await
            .unwrap()
            .unwrap();
    }

    async fn wait_for_degraded(state: &SharedState, value: bool) {
        let mut degraded = state.degraded_watcher();
        timeout(Duration::from_secs(2), degraded.wait_for(|d| *d == value))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn retries_connection_until_store_is_installed() {
        let state = app_state();
        let store = MemoryDocumentStore::new();
        let attempts = Arc::new(AtomicU32::new(0));

        let connect = {
            let store = store.clone();
            let attempts = attempts.clone();
            move || {
                let store = store.clone();
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(StorageError::unavailable("not yet".into(), std::io::Error::other("down")))
                    } else {
                        Ok(Arc::new(store) as Arc<dyn DocumentStore>)
                    }
                }
            }
        };
        let supervisor = tokio::spawn(run_with(state.clone(), connect, fast()));

        wait_for_phase(&state, SyncPhase::Synced).await;
        wait_for_degraded(&state, false).await;
        assert!(attempts.load(Ordering::SeqCst) >= 3);
        assert!(store.peek("leagueState").is_some());
        supervisor.abort();
    }

    #[tokio::test]
    async fn failing_health_check_degrades_then_recovers() {
        let state = app_state();
        let store = MemoryDocumentStore::new();
        let connect = {
            let store = store.clone();
            move || {
                let store = store.clone();
                async move {
                    store.health_check().await?;
                    Ok(Arc::new(store) as Arc<dyn DocumentStore>)
                }
            }
        };
        let supervisor = tokio::spawn(run_with(state.clone(), connect, fast()));
        wait_for_phase(&state, SyncPhase::Synced).await;

        store.set_offline(true);
        wait_for_degraded(&state, true).await;
        wait_for_phase(&state, SyncPhase::Error).await;

        store.set_offline(false);
        wait_for_degraded(&state, false).await;
        wait_for_phase(&state, SyncPhase::Synced).await;
        supervisor.abort();
    }
}
