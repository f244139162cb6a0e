//! Shared data models for all services.

pub mod query;
pub mod tab;

// Re-export commonly used types
pub use query::{ColumnMeta, JsonFormatResponse, QueryRequest, QueryResult, QueryStatistics, Row};
pub use tab::{
    CreateTabRequest, InformationTarget, MoveTabRequest, RunQueryRequest, SetActiveTabRequest, Tab,
    TabList, TabType, UpdateTabRequest, HOME_TAB_ID,
};
