//! SQL query models.
//!
//! `QueryResult` has the same shape whether the statement went through the
//! command path or the query path.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// One result row, keyed by column name in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Request body for executing a SQL query.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct QueryRequest {
    /// SQL statement to execute.
    #[serde(alias = "sql")]
    #[validate(length(min = 1, message = "query is required"))]
    pub query: String,
}

/// Column descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,

    /// ClickHouse type name, e.g. `UInt64` or `Nullable(String)`.
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Execution statistics reported by ClickHouse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueryStatistics {
    /// Server-side elapsed time in seconds.
    #[serde(default)]
    pub elapsed: f64,
    /// Rows read by the server.
    #[serde(default)]
    pub rows_read: u64,
    /// Bytes read by the server.
    #[serde(default)]
    pub bytes_read: u64,
}

/// Body of a ClickHouse response in `JSON` output format.
#[derive(Debug, Default, Deserialize)]
pub struct JsonFormatResponse {
    #[serde(default)]
    pub meta: Vec<ColumnMeta>,
    #[serde(default)]
    pub data: Vec<Row>,
    #[serde(default)]
    pub rows: Option<u64>,
    #[serde(default)]
    pub statistics: Option<QueryStatistics>,
}

/// Normalized result of a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueryResult {
    /// Column descriptors.
    pub meta: Vec<ColumnMeta>,

    /// Row objects.
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Row>,

    /// Execution statistics.
    pub statistics: QueryStatistics,

    /// Number of rows in `data`, as reported by the server.
    pub rows: u64,

    /// Error message; never set together with non-empty `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    /// Result of a command-path statement: no rows, zeroed statistics.
    pub fn command() -> Self {
        Self::default()
    }

    /// Zeroed result carrying an error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Normalizes a `JSON` format response.
    ///
    /// Rows without column metadata get descriptors derived from the first
    /// row, so `meta` is non-empty whenever `data` is.
    pub fn from_response(response: JsonFormatResponse) -> Self {
        let JsonFormatResponse {
            mut meta,
            data,
            rows,
            statistics,
        } = response;

        if meta.is_empty() {
            if let Some(first) = data.first() {
                meta = first
                    .keys()
                    .map(|name| ColumnMeta {
                        name: name.clone(),
                        data_type: "Unknown".to_string(),
                    })
                    .collect();
            }
        }

        Self {
            meta,
            rows: rows.unwrap_or(data.len() as u64),
            data,
            statistics: statistics.unwrap_or_default(),
            error: None,
        }
    }

    /// Whether this result carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
