//! greyroute Core Types and Traits
//!
//! This crate provides the fundamental types and traits shared by the greyroute crates:
//! - Grey dimension and API identifier keys
//! - The strategy repository abstraction
//! - Core error types

pub mod error;
pub mod repository;
pub mod types;

pub use error::{Error, Result};
pub use repository::StrategyRepository;
pub use types::{ApiIdentify, Dimension, Dimensions};
