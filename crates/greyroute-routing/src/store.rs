//! Versioned strategy snapshot store
//!
//! Holds the active [`AppStrategy`] behind an `ArcSwapOption`, so readers
//! always load one whole snapshot without taking a lock. Writers are
//! serialized and only replace the snapshot with a strictly newer version.

use arc_swap::ArcSwapOption;
use greyroute_core::{ApiIdentify, Dimensions};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info};

use crate::strategy::{AppStrategy, GreyDecision};

/// Result of offering a candidate snapshot to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    /// The candidate replaced the previous snapshot (if any)
    Applied { previous: Option<i64>, current: i64 },
    /// The candidate was not newer than the active snapshot
    Stale { current: i64, offered: i64 },
}

impl OfferOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, OfferOutcome::Applied { .. })
    }

    /// Version active after the offer
    pub fn current_version(&self) -> i64 {
        match self {
            OfferOutcome::Applied { current, .. } | OfferOutcome::Stale { current, .. } => *current,
        }
    }
}

/// Store for the active grey strategy snapshot
#[derive(Debug, Default)]
pub struct StrategyStore {
    current: ArcSwapOption<AppStrategy>,
    /// Serializes the version check and swap between concurrent writers
    write_lock: Mutex<()>,
}

impl StrategyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a candidate snapshot
    ///
    /// An empty store always accepts. A loaded store accepts only a
    /// strictly greater version; anything else leaves it untouched.
    pub fn offer(&self, candidate: AppStrategy) -> OfferOutcome {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let previous = self.current.load().as_ref().map(|s| s.version);
        if let Some(current) = previous
            && candidate.version <= current
        {
            info!(
                "Grey strategy pass version: offered v{} is not newer than v{}",
                candidate.version, current
            );
            return OfferOutcome::Stale {
                current,
                offered: candidate.version,
            };
        }

        let current = candidate.version;
        self.current.store(Some(Arc::new(candidate)));
        match previous {
            Some(previous) => info!("Grey strategy updated: v{} → v{}", previous, current),
            None => info!("Grey strategy loaded: v{}", current),
        }
        OfferOutcome::Applied { previous, current }
    }

    /// Current snapshot, or `None` before the first accepted offer
    pub fn snapshot(&self) -> Option<Arc<AppStrategy>> {
        self.current.load_full()
    }

    /// Version of the current snapshot
    pub fn version(&self) -> Option<i64> {
        self.current.load().as_ref().map(|s| s.version)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    /// Classify a request against the current snapshot
    ///
    /// Never fails: an empty store or a fault while evaluating the
    /// configuration both yield [`GreyDecision::not_grey`].
    pub fn resolve(&self, api: &ApiIdentify, dimensions: &Dimensions) -> GreyDecision {
        let guard = self.current.load();
        let Some(strategy) = guard.as_ref() else {
            return GreyDecision::not_grey();
        };

        contained(strategy.version, api, || strategy.resolve(api, dimensions))
    }
}

/// Run one evaluation, turning a panic into a not-grey decision
fn contained(version: i64, api: &ApiIdentify, evaluate: impl FnOnce() -> GreyDecision) -> GreyDecision {
    match panic::catch_unwind(AssertUnwindSafe(evaluate)) {
        Ok(decision) => decision,
        Err(cause) => {
            let message = cause
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                "Grey strategy v{} evaluation failed for '{}', treating as normal traffic: {}",
                version, api, message
            );
            GreyDecision::not_grey()
        }
    }
}
