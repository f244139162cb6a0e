//! Workspace tab state.
//!
//! Owns the ordered tab list and the active tab, mirrors every change to the
//! [`TabRepository`], and runs queries on behalf of tabs.
//!
//! `run_query` releases the state lock while ClickHouse works. Two runs on
//! the same tab are not coalesced: whichever finishes last wins.

use std::sync::Arc;

use common::errors::{AppError, AppResult};
use common::models::{Tab, TabList, UpdateTabRequest, HOME_TAB_ID};
use tokio::sync::RwLock;

use crate::service::QueryService;
use crate::storage::TabRepository;

#[derive(Debug, Default)]
struct TabState {
    tabs: Vec<Tab>,
    active_tab: Option<String>,
}

impl TabState {
    fn position(&self, id: &str) -> AppResult<usize> {
        self.tabs
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| AppError::TabNotFound(id.to_string()))
    }

    fn ids(&self) -> Vec<String> {
        self.tabs.iter().map(|t| t.id.clone()).collect()
    }

    fn snapshot(&self) -> TabList {
        TabList {
            tabs: self.tabs.clone(),
            active_tab: self.active_tab.clone(),
        }
    }

    /// Replaces the tab at `index` with `f(tab)` and returns the new value.
    fn apply(&mut self, index: usize, f: impl FnOnce(Tab) -> Tab) -> Tab {
        let updated = f(self.tabs[index].clone());
        self.tabs[index] = updated.clone();
        updated
    }
}

/// Tab store shared by the HTTP handlers.
pub struct TabStore {
    state: RwLock<TabState>,
    repository: Arc<dyn TabRepository>,
    queries: QueryService,
}

impl TabStore {
    /// Loads persisted tabs. The home tab is created if missing and the
    /// active tab falls back to the first tab.
    pub async fn load(repository: Arc<dyn TabRepository>, queries: QueryService) -> AppResult<Self> {
        let mut tabs: Vec<Tab> = repository
            .list()
            .await?
            .into_iter()
            .map(Tab::restored)
            .collect();

        if !tabs.iter().any(Tab::is_home) {
            let home = Tab::home();
            repository.put(&home).await?;
            tabs.insert(0, home);
            let ids: Vec<String> = tabs.iter().map(|t| t.id.clone()).collect();
            repository.reorder(&ids).await?;
        }

        let active_tab = repository
            .active_tab()
            .await?
            .filter(|id| tabs.iter().any(|t| &t.id == id))
            .or_else(|| tabs.first().map(|t| t.id.clone()));

        tracing::info!(tabs = tabs.len(), active = ?active_tab, "tab store loaded");

        Ok(Self {
            state: RwLock::new(TabState { tabs, active_tab }),
            repository,
            queries,
        })
    }

    /// All tabs and the active tab.
    pub async fn list(&self) -> TabList {
        self.state.read().await.snapshot()
    }

    /// Number of open tabs.
    pub async fn tab_count(&self) -> usize {
        self.state.read().await.tabs.len()
    }

    /// Gets a tab by ID.
    pub async fn get(&self, id: &str) -> AppResult<Tab> {
        let state = self.state.read().await;
        let index = state.position(id)?;
        Ok(state.tabs[index].clone())
    }

    /// Appends a tab and makes it active.
    pub async fn add(&self, tab: Tab) -> AppResult<Tab> {
        let mut state = self.state.write().await;
        self.repository.put(&tab).await?;
        self.repository.set_active_tab(Some(&tab.id)).await?;

        state.active_tab = Some(tab.id.clone());
        state.tabs.push(tab.clone());
        tracing::debug!(id = %tab.id, tab_type = ?tab.tab_type, "tab opened");
        Ok(tab)
    }

    /// Edits title and/or content.
    pub async fn update(&self, id: &str, req: UpdateTabRequest) -> AppResult<Tab> {
        let mut state = self.state.write().await;
        let index = state.position(id)?;
        let updated = state.tabs[index].clone().edited(req.title, req.content);
        self.repository.put(&updated).await?;
        state.tabs[index] = updated.clone();
        Ok(updated)
    }

    /// Marks a tab's content as saved.
    pub async fn mark_saved(&self, id: &str) -> AppResult<Tab> {
        let mut state = self.state.write().await;
        let index = state.position(id)?;
        let updated = state.tabs[index].clone().saved();
        self.repository.put(&updated).await?;
        state.tabs[index] = updated.clone();
        Ok(updated)
    }

    /// Closes a tab. Closing the active tab activates its left neighbour,
    /// or the new first tab.
    pub async fn remove(&self, id: &str) -> AppResult<TabList> {
        if id == HOME_TAB_ID {
            return Err(AppError::Validation("the home tab cannot be closed".into()));
        }

        let mut state = self.state.write().await;
        let index = state.position(id)?;
        let mut next = state.clone_without(index);

        if next.active_tab.as_deref() == Some(id) {
            let neighbour = index.checked_sub(1).or(if next.tabs.is_empty() { None } else { Some(0) });
            next.active_tab = neighbour.map(|i| next.tabs[i].id.clone());
        }

        self.repository.delete(id).await?;
        self.repository.reorder(&next.ids()).await?;
        self.repository.set_active_tab(next.active_tab.as_deref()).await?;

        *state = next;
        tracing::debug!(id, "tab closed");
        Ok(state.snapshot())
    }

    /// Opens a copy of a tab right after it and activates the copy.
    pub async fn duplicate(&self, id: &str) -> AppResult<Tab> {
        let mut state = self.state.write().await;
        let index = state.position(id)?;
        let copy = state.tabs[index].duplicate();

        let mut order = state.ids();
        order.insert(index + 1, copy.id.clone());

        self.repository.put(&copy).await?;
        self.repository.reorder(&order).await?;
        self.repository.set_active_tab(Some(&copy.id)).await?;

        state.tabs.insert(index + 1, copy.clone());
        state.active_tab = Some(copy.id.clone());
        Ok(copy)
    }

    /// Moves a tab to `index`, clamped to the last position.
    pub async fn move_tab(&self, id: &str, index: usize) -> AppResult<TabList> {
        let mut state = self.state.write().await;
        let from = state.position(id)?;

        let mut tabs = state.tabs.clone();
        let tab = tabs.remove(from);
        let to = index.min(tabs.len());
        tabs.insert(to, tab);

        let ids: Vec<String> = tabs.iter().map(|t| t.id.clone()).collect();
        self.repository.reorder(&ids).await?;

        state.tabs = tabs;
        Ok(state.snapshot())
    }

    /// Makes a tab active.
    pub async fn set_active(&self, id: &str) -> AppResult<TabList> {
        let mut state = self.state.write().await;
        state.position(id)?;
        self.repository.set_active_tab(Some(id)).await?;
        state.active_tab = Some(id.to_string());
        Ok(state.snapshot())
    }

    /// Closes every tab except home, which becomes active.
    pub async fn close_all(&self) -> AppResult<TabList> {
        let mut state = self.state.write().await;
        let home = state
            .tabs
            .iter()
            .find(|t| t.is_home())
            .cloned()
            .unwrap_or_else(Tab::home);

        self.repository.clear().await?;
        self.repository.put(&home).await?;
        self.repository.set_active_tab(Some(&home.id)).await?;

        *state = TabState {
            active_tab: Some(home.id.clone()),
            tabs: vec![home],
        };
        tracing::debug!("all tabs closed");
        Ok(state.snapshot())
    }

    /// Runs `query` (or the tab's content) and records the outcome on the tab.
    ///
    /// Execution failures end up in the tab's `error`; only an unknown tab ID
    /// is returned as an error. The tab never stays loading.
    pub async fn run_query(&self, tab_id: &str, query: Option<String>) -> AppResult<Tab> {
        // Run-state writes happen under the state lock so a concurrent
        // `remove` cannot be undone by a late upsert.
        let (query, loading) = {
            let mut state = self.state.write().await;
            let index = state.position(tab_id)?;
            let query = query.unwrap_or_else(|| state.tabs[index].content.clone());
            let loading = state.apply(index, Tab::loading);
            self.persist(&loading).await;
            (query, loading)
        };

        let outcome = self.queries.execute(&query).await;
        let finish = |tab: Tab| match &outcome {
            Ok(result) => tab.succeeded(result.clone()),
            Err(e) => {
                tracing::warn!(tab_id, error = %e, "query failed");
                tab.failed(e.to_string())
            }
        };

        let mut state = self.state.write().await;
        match state.position(tab_id) {
            Ok(index) => {
                let tab = state.apply(index, finish);
                self.persist(&tab).await;
                Ok(tab)
            }
            Err(_) => {
                tracing::debug!(tab_id, "tab closed while its query was running");
                Ok(finish(loading))
            }
        }
    }

    /// Writes run state; a storage failure must not mask the query outcome.
    async fn persist(&self, tab: &Tab) {
        if let Err(e) = self.repository.put(tab).await {
            tracing::warn!(id = %tab.id, error = %e, "failed to persist tab");
        }
    }
}

impl TabState {
    fn clone_without(&self, index: usize) -> TabState {
        let mut tabs = self.tabs.clone();
        tabs.remove(index);
        TabState {
            tabs,
            active_tab: self.active_tab.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::FakeClickHouse;
    use crate::storage::SqliteTabRepository;
    use common::models::{CreateTabRequest, QueryResult, TabType};

    async fn store_with(fake: Arc<FakeClickHouse>) -> (TabStore, Arc<SqliteTabRepository>) {
        let repo = Arc::new(SqliteTabRepository::connect("sqlite::memory:").await.unwrap());
        let store = TabStore::load(repo.clone(), QueryService::new(fake, false)).await.unwrap();
        (store, repo)
    }

    async fn store() -> TabStore {
        store_with(Arc::new(FakeClickHouse::default())).await.0
    }

    fn sql_tab(content: &str) -> Tab {
        Tab::new(TabType::Sql, "q", content)
    }

    /// Delays `put` for tabs in the given loading state.
    struct SlowPutRepository {
        inner: SqliteTabRepository,
        slow_when_loading: bool,
    }

    #[async_trait::async_trait]
    impl TabRepository for SlowPutRepository {
        async fn get(&self, id: &str) -> AppResult<Option<Tab>> {
            self.inner.get(id).await
        }
        async fn put(&self, tab: &Tab) -> AppResult<()> {
            if tab.id != HOME_TAB_ID && tab.is_loading == self.slow_when_loading {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            self.inner.put(tab).await
        }
        async fn delete(&self, id: &str) -> AppResult<bool> {
            self.inner.delete(id).await
        }
        async fn list(&self) -> AppResult<Vec<Tab>> {
            self.inner.list().await
        }
        async fn reorder(&self, ids: &[String]) -> AppResult<()> {
            self.inner.reorder(ids).await
        }
        async fn clear(&self) -> AppResult<()> {
            self.inner.clear().await
        }
        async fn active_tab(&self) -> AppResult<Option<String>> {
            self.inner.active_tab().await
        }
        async fn set_active_tab(&self, id: Option<&str>) -> AppResult<()> {
            self.inner.set_active_tab(id).await
        }
    }

    async fn close_during_run(slow_when_loading: bool) {
        let repo = Arc::new(SlowPutRepository {
            inner: SqliteTabRepository::connect("sqlite::memory:").await.unwrap(),
            slow_when_loading,
        });
        let queries = QueryService::new(Arc::new(FakeClickHouse::default()), false);
        let store = Arc::new(TabStore::load(repo.clone(), queries).await.unwrap());
        let tab = store.add(sql_tab("SELECT 1")).await.unwrap();

        let run = tokio::spawn({
            let store = store.clone();
            let id = tab.id.clone();
            async move { store.run_query(&id, None).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        store.remove(&tab.id).await.unwrap();

        let finished = run.await.unwrap().unwrap();
        assert!(!finished.is_loading);

        let stored: Vec<_> = repo.list().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(stored, vec![HOME_TAB_ID.to_string()]);
        assert!(store.get(&tab.id).await.is_err());
    }

    #[tokio::test]
    async fn test_tab_closed_while_saving_result_stays_closed() {
        close_during_run(false).await;
    }

    #[tokio::test]
    async fn test_tab_closed_while_marking_loading_stays_closed() {
        close_during_run(true).await;
    }

    #[tokio::test]
    async fn test_load_creates_home_tab() {
        let store = store().await;
        let list = store.list().await;
        assert_eq!(list.tabs.len(), 1);
        assert!(list.tabs[0].is_home());
        assert_eq!(list.active_tab.as_deref(), Some(HOME_TAB_ID));
    }

    #[tokio::test]
    async fn test_reload_restores_tabs_and_clears_loading() {
        let repo = Arc::new(SqliteTabRepository::connect("sqlite::memory:").await.unwrap());
        let stuck = sql_tab("SELECT 1").loading();
        repo.put(&stuck).await.unwrap();
        repo.set_active_tab(Some(&stuck.id)).await.unwrap();

        let queries = QueryService::new(Arc::new(FakeClickHouse::default()), false);
        let store = TabStore::load(repo, queries).await.unwrap();
        let list = store.list().await;

        assert_eq!(list.tabs.len(), 2);
        assert!(list.tabs[0].is_home());
        assert!(!list.tabs[1].is_loading);
        assert_eq!(list.active_tab, Some(stuck.id));
    }

    #[tokio::test]
    async fn test_run_read_query_populates_result() {
        let store = store().await;
        let tab = store.add(sql_tab("SELECT 1 AS n")).await.unwrap();

        let tab = store.run_query(&tab.id, None).await.unwrap();
        assert!(!tab.is_loading);
        assert!(tab.error.is_none());
        let result = tab.result.unwrap();
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.meta.len(), 1);
    }

    #[tokio::test]
    async fn test_run_command_stores_zeroed_result() {
        let fake = Arc::new(FakeClickHouse::default());
        let (store, _) = store_with(fake.clone()).await;
        let tab = store.add(sql_tab("")).await.unwrap();

        let tab = store
            .run_query(&tab.id, Some("CREATE TABLE t (x UInt8) ENGINE = Memory".into()))
            .await
            .unwrap();
        assert_eq!(tab.result, Some(QueryResult::command()));
        assert_eq!(fake.calls()[0].0, "command");
    }

    #[tokio::test]
    async fn test_failing_query_never_stays_loading() {
        let fake = Arc::new(FakeClickHouse::failing("Code: 62. Syntax error"));
        let (store, repo) = store_with(fake).await;
        let tab = store.add(sql_tab("SELEC 1")).await.unwrap();

        let tab = store.run_query(&tab.id, None).await.unwrap();
        assert!(!tab.is_loading);
        assert_eq!(tab.error.as_deref(), Some("Code: 62. Syntax error"));
        let result = tab.result.clone().unwrap();
        assert!(result.data.is_empty());
        assert_eq!(result.error, tab.error);

        let stored = repo.get(&tab.id).await.unwrap().unwrap();
        assert!(!stored.is_loading);
        assert_eq!(stored.error, tab.error);
    }

    #[tokio::test]
    async fn test_success_clears_previous_error() {
        let fake = Arc::new(FakeClickHouse::failing("boom"));
        let (store, _) = store_with(fake.clone()).await;
        let tab = store.add(sql_tab("SELECT 1")).await.unwrap();
        assert!(store.run_query(&tab.id, None).await.unwrap().error.is_some());

        *fake.fail_with.lock().unwrap() = None;
        let tab = store.run_query(&tab.id, None).await.unwrap();
        assert!(tab.error.is_none());
        assert!(!tab.result.unwrap().is_error());
    }

    #[tokio::test]
    async fn test_run_unknown_tab() {
        let store = store().await;
        let err = store.run_query("missing", Some("SELECT 1".into())).await.unwrap_err();
        assert!(matches!(err, AppError::TabNotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_activates_left_neighbour() {
        let store = store().await;
        let a = store.add(sql_tab("a")).await.unwrap();
        let b = store.add(sql_tab("b")).await.unwrap();
        assert_eq!(store.list().await.active_tab, Some(b.id.clone()));

        let list = store.remove(&b.id).await.unwrap();
        assert_eq!(list.active_tab, Some(a.id.clone()));
        assert_eq!(list.tabs.len(), 2);

        let err = store.remove(HOME_TAB_ID).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(matches!(store.remove(&b.id).await.unwrap_err(), AppError::TabNotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_inactive_keeps_active() {
        let store = store().await;
        let a = store.add(sql_tab("a")).await.unwrap();
        let b = store.add(sql_tab("b")).await.unwrap();
        let list = store.remove(&a.id).await.unwrap();
        assert_eq!(list.active_tab, Some(b.id));
    }

    #[tokio::test]
    async fn test_duplicate_and_move() {
        let (store, repo) = store_with(Arc::new(FakeClickHouse::default())).await;
        let a = store.add(sql_tab("a")).await.unwrap();
        let b = store.add(sql_tab("b")).await.unwrap();

        let copy = store.duplicate(&a.id).await.unwrap();
        let ids: Vec<_> = store.list().await.tabs.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![HOME_TAB_ID.to_string(), a.id.clone(), copy.id.clone(), b.id.clone()]);

        let list = store.move_tab(&b.id, 0).await.unwrap();
        assert_eq!(list.tabs[0].id, b.id);
        let list = store.move_tab(&b.id, 99).await.unwrap();
        assert_eq!(list.tabs.last().unwrap().id, b.id);

        let stored: Vec<_> = repo.list().await.unwrap().into_iter().map(|t| t.id).collect();
        let in_memory: Vec<_> = list.tabs.into_iter().map(|t| t.id).collect();
        assert_eq!(stored, in_memory);
    }

    #[tokio::test]
    async fn test_update_and_save() {
        let store = store().await;
        let tab = store
            .add(
                CreateTabRequest {
                    tab_type: TabType::SavedQuery,
                    content: Some("SELECT 1".into()),
                    ..Default::default()
                }
                .into_tab(),
            )
            .await
            .unwrap();
        assert!(tab.is_saved);

        let req = UpdateTabRequest {
            title: None,
            content: Some("SELECT 2".into()),
        };
        let tab = store.update(&tab.id, req).await.unwrap();
        assert!(!tab.is_saved);
        assert!(store.mark_saved(&tab.id).await.unwrap().is_saved);
    }

    #[tokio::test]
    async fn test_close_all_keeps_home() {
        let (store, repo) = store_with(Arc::new(FakeClickHouse::default())).await;
        store.add(sql_tab("a")).await.unwrap();
        store.add(sql_tab("b")).await.unwrap();

        let list = store.close_all().await.unwrap();
        assert_eq!(list.tabs.len(), 1);
        assert_eq!(list.active_tab.as_deref(), Some(HOME_TAB_ID));
        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert_eq!(repo.active_tab().await.unwrap().as_deref(), Some(HOME_TAB_ID));
    }

    #[tokio::test]
    async fn test_set_active() {
        let store = store().await;
        let a = store.add(sql_tab("a")).await.unwrap();
        store.add(sql_tab("b")).await.unwrap();
        assert_eq!(store.set_active(&a.id).await.unwrap().active_tab, Some(a.id));
        assert!(store.set_active("missing").await.is_err());
    }
}
