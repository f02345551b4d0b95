//! greyroute Routing Engine
//!
//! This crate decides whether a request is grey (canary) traffic and where
//! to send it:
//! - Conditions, rules and strategy documents
//! - Per-API resolution with host/port fallback
//! - Versioned, lock-free snapshot store
//! - Background refresher with manual reload

pub mod condition;
pub mod engine;
pub mod refresher;
pub mod rule;
pub mod store;
pub mod strategy;

// Re-export commonly used types
pub use condition::{Condition, ConditionKind};
pub use engine::GreyEngine;
pub use refresher::{Refresher, RefresherConfig, RefresherHandle};
pub use rule::Rule;
pub use store::{OfferOutcome, StrategyStore};
pub use strategy::{ApiStrategy, AppStrategy, GreyDecision};
