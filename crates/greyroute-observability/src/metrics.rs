//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for greyroute:
//! - Classification counts (grey / normal by API identifier)
//! - Classification latency
//! - Strategy reload outcomes
//! - Currently active strategy version

use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for greyroute
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    // Decision metrics
    /// Classification decisions by API and result
    pub decisions_total: CounterVec,
    /// Time spent classifying a request
    pub classify_duration_seconds: Histogram,

    // Reload metrics
    /// Strategy reload attempts by outcome
    pub reloads_total: CounterVec,
    /// Version of the active strategy snapshot (-1 before the first load)
    pub strategy_version: Gauge,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let decisions_total = CounterVec::new(
            Opts::new(
                "greyroute_decisions_total",
                "Total number of grey classification decisions",
            ),
            &["api", "result"],
        )?;

        let classify_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "greyroute_classify_duration_seconds",
                "Grey classification duration in seconds",
            )
            .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01]),
        )?;

        let reloads_total = CounterVec::new(
            Opts::new(
                "greyroute_reloads_total",
                "Total number of strategy reload attempts",
            ),
            &["outcome"],
        )?;

        let strategy_version = Gauge::with_opts(Opts::new(
            "greyroute_strategy_version",
            "Version of the active grey strategy (-1 when none is loaded)",
        ))?;
        strategy_version.set(-1.0);

        registry.register(Box::new(decisions_total.clone()))?;
        registry.register(Box::new(classify_duration_seconds.clone()))?;
        registry.register(Box::new(reloads_total.clone()))?;
        registry.register(Box::new(strategy_version.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            decisions_total,
            classify_duration_seconds,
            reloads_total,
            strategy_version,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// `api` label for identifiers the active strategy does not configure
    pub const UNKNOWN_API: &'static str = "unknown";

    /// Record one classification decision
    ///
    /// `api` becomes a label value, so callers must pass a bounded set
    /// (configured identifiers or [`Metrics::UNKNOWN_API`]).
    pub fn record_decision(&self, api: &str, is_grey: bool, duration_secs: f64) {
        let result = if is_grey { "grey" } else { "normal" };
        self.decisions_total.with_label_values(&[api, result]).inc();
        self.classify_duration_seconds.observe(duration_secs);
    }

    /// Record one reload attempt
    pub fn record_reload(&self, result: ReloadResult) {
        self.reloads_total
            .with_label_values(&[result.as_str()])
            .inc();
    }

    /// Publish the version of the active snapshot
    pub fn set_strategy_version(&self, version: i64) {
        self.strategy_version.set(version as f64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Reload outcome label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadResult {
    Applied,
    Stale,
    FetchError,
    ParseError,
    Timeout,
}

impl ReloadResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Stale => "stale",
            Self::FetchError => "fetch_error",
            Self::ParseError => "parse_error",
            Self::Timeout => "timeout",
        }
    }
}
