//! Shared building blocks for the CH-UI backend services.
//!
//! - `config`: environment-driven service configuration
//! - `errors`: the application error type and its HTTP mapping
//! - `logging`: tracing subscriber set-up
//! - `middleware`: request id and token authentication
//! - `models`: query results and tabs
//! - `response`: the JSON response envelope
//! - `utils`: SQL classification and id generation

pub mod config;
pub mod errors;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;

pub use errors::{AppError, AppResult};
