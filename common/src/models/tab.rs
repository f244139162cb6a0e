//! Workspace tab models.
//!
//! A tab is one open SQL session or view. State transitions are expressed as
//! functions that take a tab by value and return the updated tab.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::models::query::QueryResult;
use crate::utils::IdGenerator;

/// ID of the home tab, which always exists and cannot be closed.
pub const HOME_TAB_ID: &str = "home";

/// Kind of tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TabType {
    /// Workspace landing tab.
    Home,
    /// SQL editor.
    #[default]
    Sql,
    /// Database or table information view.
    Information,
    /// Editor opened from a saved query.
    SavedQuery,
}

impl TabType {
    /// Title used when the caller does not provide one.
    pub fn default_title(&self) -> &'static str {
        match self {
            TabType::Home => "Home",
            TabType::Sql => "New Query",
            TabType::Information => "Information",
            TabType::SavedQuery => "Saved Query",
        }
    }
}

/// Object shown by an information tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InformationTarget {
    /// Database name.
    pub database: String,
    /// Table name; `None` for a database overview.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl InformationTarget {
    /// `database` or `database.table`.
    pub fn display_name(&self) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", self.database, table),
            None => self.database.clone(),
        }
    }
}

/// A workspace tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    /// Unique tab identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Tab kind.
    #[serde(rename = "type")]
    pub tab_type: TabType,
    /// Editor content.
    #[serde(default)]
    pub content: String,
    /// A query is in flight.
    #[serde(default)]
    pub is_loading: bool,
    /// Error of the last run.
    #[serde(default)]
    pub error: Option<String>,
    /// Result of the last run.
    #[serde(default)]
    pub result: Option<QueryResult>,
    /// Content matches the saved query.
    #[serde(default)]
    pub is_saved: bool,
    /// Target of an information tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub information: Option<InformationTarget>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Tab {
    /// Creates an idle tab with a fresh ID.
    pub fn new(tab_type: TabType, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: IdGenerator::tab_id(),
            title: title.into(),
            tab_type,
            content: content.into(),
            is_loading: false,
            error: None,
            result: None,
            is_saved: false,
            information: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The home tab.
    pub fn home() -> Self {
        Self {
            id: HOME_TAB_ID.to_string(),
            ..Self::new(TabType::Home, TabType::Home.default_title(), "")
        }
    }

    /// Whether this is the home tab.
    pub fn is_home(&self) -> bool {
        self.id == HOME_TAB_ID
    }

    /// Marks a run as started.
    pub fn loading(self) -> Self {
        Self {
            is_loading: true,
            error: None,
            updated_at: Utc::now(),
            ..self
        }
    }

    /// Stores a successful result.
    pub fn succeeded(self, result: QueryResult) -> Self {
        Self {
            is_loading: false,
            error: None,
            result: Some(result),
            updated_at: Utc::now(),
            ..self
        }
    }

    /// Stores a failure and a zeroed error-shaped result.
    pub fn failed(self, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            is_loading: false,
            result: Some(QueryResult::failed(message.clone())),
            error: Some(message),
            updated_at: Utc::now(),
            ..self
        }
    }

    /// Applies an edit. Changing the content marks the tab unsaved.
    pub fn edited(self, title: Option<String>, content: Option<String>) -> Self {
        let content_changed = content.as_ref().is_some_and(|c| *c != self.content);
        Self {
            title: title.unwrap_or(self.title),
            content: content.unwrap_or(self.content),
            is_saved: self.is_saved && !content_changed,
            updated_at: Utc::now(),
            ..self
        }
    }

    /// Marks the content as saved.
    pub fn saved(self) -> Self {
        Self {
            is_saved: true,
            updated_at: Utc::now(),
            ..self
        }
    }

    /// Clears state that only makes sense while the process runs.
    /// Used when tabs are loaded from storage.
    pub fn restored(self) -> Self {
        Self {
            is_loading: false,
            ..self
        }
    }

    /// Copy with a new ID and no run state.
    pub fn duplicate(&self) -> Self {
        let mut copy = Self::new(self.tab_type, format!("{} (copy)", self.title), self.content.clone());
        copy.information = self.information.clone();
        copy
    }
}

/// Request body for opening a tab.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTabRequest {
    /// Tab kind (defaults to `sql`). The home tab cannot be opened again.
    #[serde(rename = "type", default)]
    #[validate(custom(function = "validate_openable_type"))]
    pub tab_type: TabType,
    /// Display title; derived from the type or information target if absent.
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: Option<String>,
    /// Initial editor content.
    pub content: Option<String>,
    /// Target for information tabs.
    pub information: Option<InformationTarget>,
    /// Whether the content comes from a saved query.
    pub is_saved: Option<bool>,
}

impl CreateTabRequest {
    /// Builds the new tab.
    pub fn into_tab(self) -> Tab {
        let title = match (self.title, &self.information) {
            (Some(title), _) => title,
            (None, Some(target)) => target.display_name(),
            (None, None) => self.tab_type.default_title().to_string(),
        };
        let mut tab = Tab::new(self.tab_type, title, self.content.unwrap_or_default());
        tab.is_saved = self.is_saved.unwrap_or(self.tab_type == TabType::SavedQuery);
        tab.information = self.information;
        tab
    }
}

fn validate_openable_type(tab_type: &TabType) -> Result<(), ValidationError> {
    if *tab_type == TabType::Home {
        return Err(ValidationError::new("home_tab")
            .with_message("the home tab already exists".into()));
    }
    Ok(())
}

/// Request body for editing a tab.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateTabRequest {
    /// New title.
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: Option<String>,
    /// New editor content.
    pub content: Option<String>,
}

/// Request body for running a query in a tab.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RunQueryRequest {
    /// SQL to run; defaults to the tab content.
    pub query: Option<String>,
}

/// Request body for reordering a tab.
#[derive(Debug, Deserialize, ToSchema)]
pub struct MoveTabRequest {
    /// Target position (clamped to the last position).
    pub index: usize,
}

/// Request body for changing the active tab.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetActiveTabRequest {
    /// ID of the tab to activate.
    pub id: String,
}

/// All tabs in display order plus the active tab.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TabList {
    /// Tabs in display order.
    pub tabs: Vec<Tab>,
    /// ID of the active tab.
    pub active_tab: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_transitions() {
        let tab = Tab::new(TabType::Sql, "q", "SELECT 1").failed("old error");
        let tab = tab.loading();
        assert!(tab.is_loading);
        assert!(tab.error.is_none());

        let done = tab.clone().succeeded(QueryResult::command());
        assert!(!done.is_loading);
        assert!(done.error.is_none());
        assert_eq!(done.result, Some(QueryResult::command()));

        let failed = tab.failed("syntax error");
        assert!(!failed.is_loading);
        assert_eq!(failed.error.as_deref(), Some("syntax error"));
        assert_eq!(failed.result.unwrap().error.as_deref(), Some("syntax error"));
    }

    #[test]
    fn test_edit_marks_unsaved_only_on_content_change() {
        let tab = Tab::new(TabType::SavedQuery, "q", "SELECT 1").saved();
        let renamed = tab.clone().edited(Some("renamed".into()), None);
        assert!(renamed.is_saved);
        assert_eq!(renamed.title, "renamed");

        let same = tab.clone().edited(None, Some("SELECT 1".into()));
        assert!(same.is_saved);

        let changed = tab.edited(None, Some("SELECT 2".into()));
        assert!(!changed.is_saved);
        assert_eq!(changed.content, "SELECT 2");
    }

    #[test]
    fn test_duplicate() {
        let tab = Tab::new(TabType::Sql, "q", "SELECT 1").loading();
        let copy = tab.duplicate();
        assert_ne!(copy.id, tab.id);
        assert_eq!(copy.title, "q (copy)");
        assert_eq!(copy.content, "SELECT 1");
        assert!(!copy.is_loading);
    }

    #[test]
    fn test_create_request_titles() {
        let info = CreateTabRequest {
            tab_type: TabType::Information,
            information: Some(InformationTarget {
                database: "default".into(),
                table: Some("events".into()),
            }),
            ..Default::default()
        }
        .into_tab();
        assert_eq!(info.title, "default.events");

        let sql = CreateTabRequest::default().into_tab();
        assert_eq!(sql.tab_type, TabType::Sql);
        assert_eq!(sql.title, "New Query");
        assert!(!sql.is_saved);

        let saved = CreateTabRequest {
            tab_type: TabType::SavedQuery,
            ..Default::default()
        }
        .into_tab();
        assert!(saved.is_saved);
    }

    #[test]
    fn test_create_request_rejects_home_type() {
        let req: CreateTabRequest = serde_json::from_value(serde_json::json!({"type": "home"})).unwrap();
        assert!(req.validate().is_err());

        let req: CreateTabRequest = serde_json::from_value(serde_json::json!({"type": "saved_query"})).unwrap();
        assert!(req.validate().is_ok());
        assert!(CreateTabRequest::default().validate().is_ok());
    }

    #[test]
    fn test_camel_case_wire_format() {
        let value = serde_json::to_value(Tab::home()).unwrap();
        assert_eq!(value["id"], "home");
        assert_eq!(value["type"], "home");
        assert_eq!(value["isLoading"], false);
        assert_eq!(value["isSaved"], false);
        assert!(value.get("createdAt").is_some());
    }
}
