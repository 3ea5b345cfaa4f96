use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{counter_store::CounterStore, storage::StorageError},
    state::SharedState,
};

/// Timing knobs of the supervisor loop.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTimings {
    /// First retry delay after a failure.
    pub initial_delay: Duration,
    /// Upper bound of the exponential backoff.
    pub max_delay: Duration,
    /// Pause between health checks of a healthy store.
    pub health_poll_interval: Duration,
    /// Reconnect attempts before the store is dropped and rebuilt.
    pub max_reconnect_attempts: u32,
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(10),
            health_poll_interval: Duration::from_secs(5),
            max_reconnect_attempts: 3,
        }
    }
}

struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(timings: &SupervisorTimings) -> Self {
        Self {
            initial: timings.initial_delay,
            max: timings.max_delay,
            current: timings.initial_delay,
        }
    }

    async fn wait(&mut self) {
        sleep(self.current).await;
        self.current = (self.current * 2).min(self.max);
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Keep a counter store installed in the shared state, toggling degraded mode
/// while the backend is unreachable.
pub async fn run<F, Fut>(state: SharedState, connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn CounterStore>, StorageError>> + Send,
{
    run_with(state, connect, SupervisorTimings::default()).await
}

/// [`run`] with explicit timings.
pub async fn run_with<F, Fut>(state: SharedState, mut connect: F, timings: SupervisorTimings)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn CounterStore>, StorageError>> + Send,
{
    let mut backoff = Backoff::new(&timings);

    loop {
        match connect().await {
            Ok(store) => {
                state.set_store(store.clone()).await;
                info!("counter store connected; leaving degraded mode");
                backoff.reset();

                watch_store(&state, store.as_ref(), &timings).await;

                warn!("exhausted counter store reconnect attempts; rebuilding the connection");
                state.clear_store().await;
                backoff.wait().await;
            }
            Err(err) => {
                warn!(error = %err, "counter store connection attempt failed");
                backoff.wait().await;
            }
        }
    }
}

/// Poll the store until it fails and cannot be revived in place.
async fn watch_store(state: &SharedState, store: &dyn CounterStore, timings: &SupervisorTimings) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!("counter store healthy again; leaving degraded mode");
                    state.update_degraded(false).await;
                }
                sleep(timings.health_poll_interval).await;
            }
            Err(err) => {
                warn!(error = %err, "counter store health check failed");
                if !reconnect(state, store, timings).await {
                    return;
                }
                state.update_degraded(false).await;
                sleep(timings.health_poll_interval).await;
            }
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn CounterStore, timings: &SupervisorTimings) -> bool {
    let mut backoff = Backoff::new(timings);
    for attempt in 0..timings.max_reconnect_attempts {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "counter store reconnected after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "first reconnect attempt failed; entering degraded mode");
                    state.update_degraded(true).await;
                } else {
                    warn!(attempt, error = %err, "reconnect attempt failed");
                }
                backoff.wait().await;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use futures::{FutureExt, future::BoxFuture};
    use serde_json::Value;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{counter_store::Batch, storage::StorageResult},
        state::AppState,
    };

    /// Store whose health can be toggled from the test.
    #[derive(Clone, Default)]
    struct FlakyStore {
        down: Arc<AtomicBool>,
    }

    impl FlakyStore {
        fn outcome(&self) -> StorageResult<()> {
            if self.down.load(Ordering::SeqCst) {
                Err(StorageError::unavailable("down".into(), std::io::Error::other("down")))
            } else {
                Ok(())
            }
        }
    }

    impl CounterStore for FlakyStore {
        fn exec(&self, _batch: Batch) -> BoxFuture<'static, StorageResult<Vec<Value>>> {
            async { Ok(Vec::new()) }.boxed()
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            let outcome = self.outcome();
            async move { outcome }.boxed()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            let outcome = self.outcome();
            async move { outcome }.boxed()
        }
    }

    async fn wait_for(state: &SharedState, degraded: bool) {
        let mut watcher = state.degraded_watcher();
        while *watcher.borrow_and_update() != degraded {
            watcher.changed().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_connected_then_tracks_health() {
        let state = AppState::new(AppConfig::default());
        let store = FlakyStore::default();
        let attempts = Arc::new(AtomicU32::new(0));

        let connect = {
            let store = store.clone();
            let attempts = attempts.clone();
            move || {
                let store = store.clone();
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(StorageError::unavailable("refused".into(), std::io::Error::other("refused")))
                    } else {
                        Ok(Arc::new(store) as Arc<dyn CounterStore>)
                    }
                }
            }
        };
        let handle = tokio::spawn(run_with(state.clone(), connect, SupervisorTimings::default()));

        wait_for(&state, false).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(state.store().await.is_some());

        store.down.store(true, Ordering::SeqCst);
        wait_for(&state, true).await;

        store.down.store(false, Ordering::SeqCst);
        wait_for(&state, false).await;

        handle.abort();
    }
}
