//! Application state for query service.

use std::sync::Arc;

use common::config::AppConfig;

use crate::clickhouse::{ClickHouseExecutor, HttpClickHouse};
use crate::service::QueryService;
use crate::storage::{SqliteTabRepository, TabRepository};
use crate::tab_store::TabStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub queries: QueryService,
    pub tabs: Arc<TabStore>,
}

impl AppState {
    /// Connects the ClickHouse client and opens the tab store.
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let executor = Arc::new(HttpClickHouse::new(
            config.clickhouse.clone(),
            config.request_timeout(),
        )?);
        let repository = Arc::new(SqliteTabRepository::connect(&config.tab_store_url).await?);
        Self::with_parts(config, executor, repository).await
    }

    /// Builds the state from explicit parts.
    pub async fn with_parts(
        config: AppConfig,
        executor: Arc<dyn ClickHouseExecutor>,
        repository: Arc<dyn TabRepository>,
    ) -> anyhow::Result<Self> {
        let queries = QueryService::new(executor, config.read_only);
        let tabs = Arc::new(TabStore::load(repository, queries.clone()).await?);
        Ok(Self {
            config,
            queries,
            tabs,
        })
    }
}
