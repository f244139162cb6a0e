//! 查询执行服务模块

use std::sync::Arc;
use std::time::Instant;

use common::errors::{AppError, AppResult};
use common::models::QueryResult;
use common::utils::{ExecutionPath, SqlClassifier};

use crate::clickhouse::ClickHouseExecutor;

/// SQL 查询执行服务
///
/// 按语句分类选择 command 或 query 路径执行。
#[derive(Clone)]
pub struct QueryService {
    executor: Arc<dyn ClickHouseExecutor>,
    read_only: bool,
}

impl QueryService {
    /// 创建新的查询服务实例
    pub fn new(executor: Arc<dyn ClickHouseExecutor>, read_only: bool) -> Self {
        Self {
            executor,
            read_only,
        }
    }

    /// 执行 SQL 语句
    pub async fn execute(&self, sql: &str) -> AppResult<QueryResult> {
        let sql = trim_statement(sql);
        if sql.is_empty() {
            return Err(AppError::Validation("query is empty".into()));
        }

        let classification = SqlClassifier::classify(sql);
        let start = Instant::now();

        let result = match classification.path {
            ExecutionPath::Command => {
                if self.read_only {
                    return Err(AppError::ReadOnly(format!(
                        "{} statements are not allowed",
                        classification.label.unwrap_or("mutating")
                    )));
                }
                self.executor.command(sql).await?;
                QueryResult::command()
            }
            ExecutionPath::Query => QueryResult::from_response(self.executor.query(sql).await?),
        };

        tracing::info!(
            path = ?classification.path,
            label = classification.label.unwrap_or("-"),
            rows = result.rows,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "statement executed"
        );
        Ok(result)
    }

    /// 底层 ClickHouse 客户端
    pub fn executor(&self) -> &Arc<dyn ClickHouseExecutor> {
        &self.executor
    }
}

/// Trims whitespace and trailing semicolons.
fn trim_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}
