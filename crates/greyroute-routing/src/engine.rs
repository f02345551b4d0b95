//! Grey engine service object
//!
//! `GreyEngine` ties the store and the refresher together and exposes the
//! surface the gateway uses: `initialize`, `classify`, `force_reload` and
//! `shutdown`. It is cheap to clone and owns no global state, so several
//! independent engines (e.g. one per tenant) can coexist.

use arc_swap::ArcSwap;
use greyroute_core::{ApiIdentify, Dimensions, Result, StrategyRepository};
use greyroute_observability::{Metrics, ReadinessChecker};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::refresher::{Refresher, RefresherConfig, RefresherHandle};
use crate::store::{OfferOutcome, StrategyStore};
use crate::strategy::{AppStrategy, GreyDecision};

struct EngineInner {
    store: Arc<StrategyStore>,
    refresher: Arc<Refresher>,
    config: ArcSwap<RefresherConfig>,
    task: Mutex<Option<RefresherHandle>>,
    metrics: Option<Arc<Metrics>>,
}

/// Grey traffic classification engine
///
/// # Example
/// ```no_run
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # use greyroute_core::{ApiIdentify, Dimension, Dimensions, StrategyRepository};
/// # use greyroute_routing::{GreyEngine, RefresherConfig};
/// # async fn example(repository: Arc<dyn StrategyRepository>) -> greyroute_core::Result<()> {
/// let engine = GreyEngine::new(repository);
/// engine.initialize(RefresherConfig::new(Duration::from_secs(5))).await?;
///
/// let mut dimensions = Dimensions::new();
/// dimensions.insert(Dimension::version(), "v1".to_string());
/// let decision = engine.classify(&ApiIdentify::online_json_direct(), &dimensions);
/// if let Some(target) = decision.authority() {
///     println!("forward to {}", target);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GreyEngine {
    inner: Arc<EngineInner>,
}

impl GreyEngine {
    /// Create an engine backed by `repository`, with no strategy loaded
    pub fn new(repository: Arc<dyn StrategyRepository>) -> Self {
        Self::build(repository, None)
    }

    /// Create an engine that records decisions and reloads in `metrics`
    pub fn with_metrics(repository: Arc<dyn StrategyRepository>, metrics: Arc<Metrics>) -> Self {
        Self::build(repository, Some(metrics))
    }

    fn build(repository: Arc<dyn StrategyRepository>, metrics: Option<Arc<Metrics>>) -> Self {
        let store = Arc::new(StrategyStore::new());
        let mut refresher = Refresher::new(repository, Arc::clone(&store));
        if let Some(metrics) = &metrics {
            refresher = refresher.with_metrics(Arc::clone(metrics));
        }

        Self {
            inner: Arc::new(EngineInner {
                store,
                refresher: Arc::new(refresher),
                config: ArcSwap::from_pointee(RefresherConfig::default()),
                task: Mutex::new(None),
                metrics,
            }),
        }
    }

    /// Load the strategy once, then keep it fresh in the background
    ///
    /// The periodic task is started at most once per engine; later calls
    /// only perform the synchronous load.
    ///
    /// # Errors
    /// - `Error::Config` for a zero interval or timeout
    /// - any fetch or parse error of the initial load (the task is not started)
    pub async fn initialize(&self, config: RefresherConfig) -> Result<()> {
        config.validate()?;

        let mut task = self.inner.task.lock().await;
        self.inner.config.store(Arc::new(config));
        self.inner.refresher.reload(config.fetch_timeout).await?;

        if task.is_none() {
            info!(
                "Starting grey strategy refresher (interval {:?}, fetch timeout {:?})",
                config.interval, config.fetch_timeout
            );
            *task = Some(Arc::clone(&self.inner.refresher).spawn(config));
        } else {
            debug!("Grey strategy refresher already running");
        }
        Ok(())
    }

    /// Classify a request
    ///
    /// Total: returns `(false, "", 0)` before the first load, for unknown
    /// APIs, and when evaluating the configuration fails.
    pub fn classify(&self, api: &ApiIdentify, dimensions: &Dimensions) -> GreyDecision {
        let started = Instant::now();
        let decision = self.inner.store.resolve(api, dimensions);

        if let Some(metrics) = &self.inner.metrics {
            metrics.record_decision(
                self.metric_label(api),
                decision.is_grey,
                started.elapsed().as_secs_f64(),
            );
        }
        debug!(
            "Grey classification for '{}': grey={} target={}:{}",
            api, decision.is_grey, decision.host, decision.port
        );
        decision
    }

    /// Identifiers come straight from requests; only configured ones get their own series
    fn metric_label<'a>(&self, api: &'a ApiIdentify) -> &'a str {
        let known = self
            .inner
            .store
            .snapshot()
            .is_some_and(|strategy| strategy.apis.contains_key(api));
        if known { api.as_str() } else { Metrics::UNKNOWN_API }
    }

    /// Reload the strategy now, outside the timer
    ///
    /// Used when configuration is pushed rather than polled.
    pub async fn force_reload(&self) -> Result<OfferOutcome> {
        let fetch_timeout = self.inner.config.load().fetch_timeout;
        self.inner.refresher.reload(fetch_timeout).await
    }

    /// Stop the background refresh task
    ///
    /// The last snapshot keeps serving; `initialize` may start a new task.
    pub async fn shutdown(&self) {
        let handle = self.inner.task.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!("Grey strategy refresher shut down");
        }
    }

    /// Whether the background refresh task is running
    pub async fn is_refreshing(&self) -> bool {
        self.inner
            .task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Current strategy snapshot
    pub fn snapshot(&self) -> Option<Arc<AppStrategy>> {
        self.inner.store.snapshot()
    }

    /// Version of the current strategy snapshot
    pub fn version(&self) -> Option<i64> {
        self.inner.store.version()
    }

    /// The underlying snapshot store
    pub fn store(&self) -> &Arc<StrategyStore> {
        &self.inner.store
    }
}

impl ReadinessChecker for GreyEngine {
    fn is_ready(&self) -> bool {
        self.inner.store.is_loaded()
    }

    fn strategy_version(&self) -> Option<i64> {
        self.version()
    }
}
