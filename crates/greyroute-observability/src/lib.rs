//! greyroute Observability
//!
//! This crate provides observability features:
//! - Metrics collection (Prometheus) for grey decisions and strategy reloads
//! - Health endpoints

pub mod health;
pub mod metrics;

pub use health::{HealthState, ReadinessChecker, health_router};
pub use metrics::{Metrics, ReloadResult};
