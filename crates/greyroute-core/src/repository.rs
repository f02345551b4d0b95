//! Strategy repository trait
//!
//! The `StrategyRepository` trait abstracts where the raw grey strategy
//! document comes from (database, remote API, file). The engine only ever
//! asks for the current document and parses it itself.

use async_trait::async_trait;

use crate::{Error, Result};

/// Source of the raw strategy document
///
/// Implementations:
/// - `FileStrategyRepository`: JSON document on disk
/// - any embedder-provided database or HTTP lookup
///
/// # Example
/// ```no_run
/// # use greyroute_core::StrategyRepository;
/// # async fn example(repository: &dyn StrategyRepository) -> greyroute_core::Result<()> {
/// let document = repository.fetch().await?;
/// println!("{}", document);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait StrategyRepository: Send + Sync {
    /// Fetch the current strategy document
    ///
    /// # Errors
    /// - `Error::Fetch` if the backing source is unreachable
    /// - `Error::ConfigNotFound` if no document exists
    async fn fetch(&self) -> Result<String>;

    /// Replace the stored strategy document
    ///
    /// Only push-style repositories support this; the default rejects it.
    ///
    /// # Errors
    /// - `Error::ConfigValidation` if the document is not a valid strategy
    /// - `Error::Unsupported` for read-only repositories
    async fn store(&self, _document: String) -> Result<()> {
        Err(Error::Unsupported(
            "Repository is read-only".to_string(),
        ))
    }
}
