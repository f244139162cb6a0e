//! ClickHouse HTTP client.
//!
//! Statements are POSTed as the request body. Reads ask for the `JSON`
//! output format through `default_format`; commands ignore the body.

use std::time::Duration;

use async_trait::async_trait;
use common::config::ClickHouseConfig;
use common::errors::{AppError, AppResult};
use common::models::JsonFormatResponse;
use common::utils::IdGenerator;

const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";
const QUERY_ID_PREFIX: &str = "ch-ui";

/// Executes statements against ClickHouse.
#[async_trait]
pub trait ClickHouseExecutor: Send + Sync {
    /// Runs a read-only statement and returns the decoded `JSON` body.
    async fn query(&self, sql: &str) -> AppResult<JsonFormatResponse>;

    /// Runs a side-effecting statement.
    async fn command(&self, sql: &str) -> AppResult<()>;

    /// Checks that the server answers `/ping`.
    async fn ping(&self) -> AppResult<()>;
}

/// `reqwest`-based client for the ClickHouse HTTP interface.
pub struct HttpClickHouse {
    client: reqwest::Client,
    config: ClickHouseConfig,
    base_url: String,
}

impl HttpClickHouse {
    /// Creates a client with the given request timeout.
    pub fn new(config: ClickHouseConfig, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        let base_url = config.url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn statement(&self, sql: &str, format: Option<&str>) -> reqwest::RequestBuilder {
        let mut params: Vec<(&str, String)> = vec![("query_id", IdGenerator::query_id(QUERY_ID_PREFIX))];
        if let Some(db) = self.config.database.as_deref().filter(|db| !db.is_empty()) {
            params.push(("database", db.to_string()));
        }
        if let Some(format) = format {
            params.push(("default_format", format.to_string()));
        }

        let mut rb = self
            .client
            .post(format!("{}/", self.base_url))
            .query(&params)
            .header(USER_HEADER, &self.config.username);
        if let Some(password) = &self.config.password {
            rb = rb.header(KEY_HEADER, password);
        }
        rb.body(sql.to_string())
    }

    async fn send(&self, rb: reqwest::RequestBuilder) -> AppResult<reqwest::Response> {
        let response = rb
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("ClickHouse request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match body.trim() {
            "" => format!("ClickHouse returned HTTP {}", status),
            text => text.to_string(),
        };
        Err(AppError::clickhouse(Some(status.as_u16()), message))
    }
}

#[async_trait]
impl ClickHouseExecutor for HttpClickHouse {
    async fn query(&self, sql: &str) -> AppResult<JsonFormatResponse> {
        let response = self.send(self.statement(sql, Some("JSON"))).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::ExternalService(format!("failed to read ClickHouse response: {}", e)))?;

        // Statements without output (e.g. SET) come back with an empty body.
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonFormatResponse::default());
        }

        serde_json::from_slice(&body)
            .map_err(|e| AppError::clickhouse(None, format!("invalid JSON in ClickHouse response: {}", e)))
    }

    async fn command(&self, sql: &str) -> AppResult<()> {
        let response = self.send(self.statement(sql, None)).await?;
        // Drain so the connection returns to the pool.
        let _ = response.bytes().await;
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        let response = self.send(self.client.get(format!("{}/ping", self.base_url))).await?;
        let body = response.text().await.unwrap_or_default();
        if body.trim() == "Ok." {
            Ok(())
        } else {
            Err(AppError::clickhouse(None, format!("unexpected ping response: {}", body.trim())))
        }
    }
}
