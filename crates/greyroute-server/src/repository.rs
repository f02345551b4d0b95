//! In-memory strategy repository used when no strategy file is configured

use async_trait::async_trait;
use greyroute_core::{Result, StrategyRepository};
use tokio::sync::RwLock;
use tracing::debug;

/// Strategy document shipped with the binary
pub const DEMO_STRATEGY: &str = include_str!("../demo/strategy.json");

/// Holds the strategy document in memory; `store` replaces it wholesale
#[derive(Debug)]
pub struct MemoryStrategyRepository {
    document: RwLock<String>,
}

impl MemoryStrategyRepository {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: RwLock::new(document.into()),
        }
    }

    pub fn demo() -> Self {
        Self::new(DEMO_STRATEGY)
    }
}

#[async_trait]
impl StrategyRepository for MemoryStrategyRepository {
    async fn fetch(&self) -> Result<String> {
        Ok(self.document.read().await.clone())
    }

    async fn store(&self, document: String) -> Result<()> {
        debug!("Replacing in-memory strategy ({} bytes)", document.len());
        *self.document.write().await = document;
        Ok(())
    }
}
