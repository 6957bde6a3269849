//! Wiring shared by every command: config, the testing-service client and
//! the durable client-state store.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::adapters::http::HttpTestingApi;
use crate::adapters::memory::InMemoryDurableStore;
use crate::adapters::sqlite::{initialize_database, SqliteDurableStore};
use crate::domain::models::Config;
use crate::domain::ports::DurableStore;
use crate::services::{ComparisonOrchestrator, ExecutionCoordinator, FixTracker, PollPolicy};

pub struct AppContext {
    pub config: Config,
    pub api: Arc<HttpTestingApi>,
    pub store: Arc<dyn DurableStore>,
}

impl AppContext {
    pub async fn build(config: Config, ephemeral: bool) -> Result<Self> {
        let api = HttpTestingApi::new(&config.api).context("Failed to build testing service client")?;

        let store: Arc<dyn DurableStore> = if ephemeral {
            debug!("using in-memory client state");
            Arc::new(InMemoryDurableStore::new())
        } else {
            let pool = initialize_database(&config.database)
                .await
                .with_context(|| format!("Failed to open state database at {}", config.database.path))?;
            Arc::new(SqliteDurableStore::new(pool))
        };

        Ok(Self {
            config,
            api: Arc::new(api),
            store,
        })
    }

    pub fn coordinator(&self) -> ExecutionCoordinator {
        ExecutionCoordinator::new(self.api.clone(), self.config.execution.max_concurrent_workers)
    }

    pub fn comparisons(&self) -> ComparisonOrchestrator {
        ComparisonOrchestrator::new(
            self.api.clone(),
            Arc::clone(&self.store),
            PollPolicy::from(&self.config.comparison),
        )
    }

    pub fn fixes(&self) -> FixTracker {
        FixTracker::new(self.api.clone())
    }
}
