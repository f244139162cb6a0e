//! Application state for gateway service.

use common::config::{AppConfig, ServiceUrls};
use common::middleware::AuthToken;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub service_urls: ServiceUrls,
    pub http_client: reqwest::Client,
    pub auth: AuthToken,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        Self::with_urls(config, ServiceUrls::load())
    }

    /// Creates the state with explicit downstream addresses.
    pub fn with_urls(config: AppConfig, service_urls: ServiceUrls) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let auth = AuthToken::new(config.api_token.clone());

        Ok(Self {
            config,
            service_urls,
            http_client,
            auth,
        })
    }
}
