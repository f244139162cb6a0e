//! Unique ID generator.
//!
//! Provides utilities for generating unique identifiers.

use uuid::Uuid;

/// Generates unique identifiers for various entities.
pub struct IdGenerator;

impl IdGenerator {
    /// Generates a unique tab ID.
    pub fn tab_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Generates a unique request ID.
    pub fn request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Generates a ClickHouse `query_id` for a statement issued by `service`.
    ///
    /// The prefix makes console-issued queries easy to find in
    /// `system.query_log`.
    pub fn query_id(service: &str) -> String {
        format!("{}-{}", service, Uuid::new_v4().simple())
    }
}
