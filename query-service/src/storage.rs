//! Tab persistence.
//!
//! Tabs are stored as JSON documents keyed by ID, with an explicit position
//! column for display order. The active tab ID lives in a settings table.

use async_trait::async_trait;
use chrono::Utc;
use common::errors::AppResult;
use common::models::Tab;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

const ACTIVE_TAB_KEY: &str = "active_tab";

/// Key-value store for tabs.
#[async_trait]
pub trait TabRepository: Send + Sync {
    /// Gets a tab by ID.
    async fn get(&self, id: &str) -> AppResult<Option<Tab>>;

    /// Inserts or replaces a tab. New tabs are appended at the end.
    async fn put(&self, tab: &Tab) -> AppResult<()>;

    /// Deletes a tab; returns whether it existed.
    async fn delete(&self, id: &str) -> AppResult<bool>;

    /// All tabs in display order.
    async fn list(&self) -> AppResult<Vec<Tab>>;

    /// Rewrites positions so tabs follow the order of `ids`.
    async fn reorder(&self, ids: &[String]) -> AppResult<()>;

    /// Deletes every tab.
    async fn clear(&self) -> AppResult<()>;

    /// Stored active tab ID.
    async fn active_tab(&self) -> AppResult<Option<String>>;

    /// Stores (or clears) the active tab ID.
    async fn set_active_tab(&self, id: Option<&str>) -> AppResult<()>;
}

/// SQLite-backed [`TabRepository`].
pub struct SqliteTabRepository {
    pool: SqlitePool,
}

impl SqliteTabRepository {
    /// Opens the database at `url` and ensures the schema exists.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        Self::new(pool).await
    }

    /// Wraps an existing pool and ensures the schema exists.
    pub async fn new(pool: SqlitePool) -> AppResult<Self> {
        let repo = Self { pool };
        repo.init_schema().await?;
        Ok(repo)
    }

    async fn init_schema(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tabs (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::debug!("tab store schema ensured");
        Ok(())
    }
}

#[async_trait]
impl TabRepository for SqliteTabRepository {
    async fn get(&self, id: &str) -> AppResult<Option<Tab>> {
        let body: Option<String> = sqlx::query_scalar("SELECT body FROM tabs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(body.map(|b| serde_json::from_str::<Tab>(&b)).transpose()?)
    }

    async fn put(&self, tab: &Tab) -> AppResult<()> {
        let body = serde_json::to_string(tab)?;
        sqlx::query(
            r#"
            INSERT INTO tabs (id, position, body, updated_at)
            VALUES (?, (SELECT COALESCE(MAX(position) + 1, 0) FROM tabs), ?, ?)
            ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
        )
        .bind(&tab.id)
        .bind(body)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM tabs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> AppResult<Vec<Tab>> {
        let bodies: Vec<String> = sqlx::query_scalar("SELECT body FROM tabs ORDER BY position, id")
            .fetch_all(&self.pool)
            .await?;

        let mut tabs = Vec::with_capacity(bodies.len());
        for body in bodies {
            match serde_json::from_str::<Tab>(&body) {
                Ok(tab) => tabs.push(tab),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable stored tab"),
            }
        }
        Ok(tabs)
    }

    async fn reorder(&self, ids: &[String]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for (position, id) in ids.iter().enumerate() {
            sqlx::query("UPDATE tabs SET position = ? WHERE id = ?")
                .bind(position as i64)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        sqlx::query("DELETE FROM tabs").execute(&self.pool).await?;
        Ok(())
    }

    async fn active_tab(&self) -> AppResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(ACTIVE_TAB_KEY)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_active_tab(&self, id: Option<&str>) -> AppResult<()> {
        match id {
            Some(id) => {
                sqlx::query(
                    "INSERT INTO settings (key, value) VALUES (?, ?) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                )
                .bind(ACTIVE_TAB_KEY)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM settings WHERE key = ?")
                    .bind(ACTIVE_TAB_KEY)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }
}
