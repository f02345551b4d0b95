//! Background strategy refresher
//!
//! Periodically fetches the raw document from the [`StrategyRepository`],
//! parses it and offers it to the [`StrategyStore`]. Failures keep the
//! previous snapshot active and are only logged and counted.

use greyroute_core::{Error, Result, StrategyRepository};
use greyroute_observability::{Metrics, ReloadResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, warn};

use crate::store::{OfferOutcome, StrategyStore};
use crate::strategy::AppStrategy;

/// Refresh timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefresherConfig {
    /// Time between two refresh attempts
    pub interval: Duration,
    /// Upper bound for a single repository fetch
    pub fetch_timeout: Duration,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(3),
        }
    }
}

impl RefresherConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Config(
                "Refresh interval must be greater than zero".to_string(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(Error::Config(
                "Fetch timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fetch-parse-offer pipeline shared by the timer and manual reloads
pub struct Refresher {
    repository: Arc<dyn StrategyRepository>,
    store: Arc<StrategyStore>,
    metrics: Option<Arc<Metrics>>,
}

impl Refresher {
    pub fn new(repository: Arc<dyn StrategyRepository>, store: Arc<StrategyStore>) -> Self {
        Self {
            repository,
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fetch, parse and offer the current document once
    ///
    /// # Errors
    /// - `Error::FetchTimeout` if the repository does not answer in time
    /// - any repository error (`Error::Fetch`, `Error::ConfigNotFound`, ...)
    /// - `Error::Parse` if the document is not a valid strategy
    pub async fn reload(&self, fetch_timeout: Duration) -> Result<OfferOutcome> {
        let document = match tokio::time::timeout(fetch_timeout, self.repository.fetch()).await {
            Ok(Ok(document)) => document,
            Ok(Err(e)) => {
                self.record(ReloadResult::FetchError);
                return Err(e);
            }
            Err(_) => {
                self.record(ReloadResult::Timeout);
                return Err(Error::FetchTimeout(fetch_timeout));
            }
        };

        let candidate = AppStrategy::from_json(&document).inspect_err(|_| {
            self.record(ReloadResult::ParseError);
        })?;

        let outcome = self.store.offer(candidate);
        match outcome {
            OfferOutcome::Applied { current, .. } => {
                self.record(ReloadResult::Applied);
                if let Some(metrics) = &self.metrics {
                    metrics.set_strategy_version(current);
                }
            }
            OfferOutcome::Stale { .. } => self.record(ReloadResult::Stale),
        }
        Ok(outcome)
    }

    fn record(&self, result: ReloadResult) {
        if let Some(metrics) = &self.metrics {
            metrics.record_reload(result);
        }
    }

    /// Start the periodic refresh task
    ///
    /// The first tick fires one `interval` after spawning. The task stops
    /// when [`RefresherHandle::shutdown`] is called or the handle is dropped.
    pub fn spawn(self: Arc<Self>, config: RefresherConfig) -> RefresherHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.reload(config.fetch_timeout).await {
                            error!("Grey strategy refresh failed, keeping previous snapshot: {}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            debug!("Grey strategy refresher stopped");
        });

        RefresherHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }
}

/// Handle to a running refresh task
pub struct RefresherHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RefresherHandle {
    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and wait for it to exit
    ///
    /// A refresh already in flight completes (bounded by the fetch timeout).
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!("Grey strategy refresher exited abnormally: {}", e);
        }
    }
}
