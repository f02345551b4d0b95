//! File-based strategy repository for greyroute
//!
//! This crate implements the `StrategyRepository` trait on top of a JSON
//! document on disk. It suits single-node deployments where operators edit
//! the grey strategy as a file.
//!
//! # Features
//! - File-based strategy storage
//! - Real-time file watching with `notify`
//! - Structural validation before writes
//!
//! # Example
//! ```no_run
//! # use greyroute_config_file::FileStrategyRepository;
//! # use greyroute_core::StrategyRepository;
//! # async fn example() -> greyroute_core::Result<()> {
//! let repository = FileStrategyRepository::new("~/.greyroute/strategy.json").await?;
//! let document = repository.fetch().await?;
//! # Ok(())
//! # }
//! ```

mod file_store;

pub use file_store::{FileStrategyRepository, StrategyChange, StrategyChangeStream};
