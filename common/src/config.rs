//! Service configuration.
//!
//! All settings come from environment variables. A `.env` file in the
//! working directory supplies values for variables the real environment
//! does not set. The file is only read, never exported into the process
//! environment.

use std::collections::HashMap;
use std::time::Duration;

/// ClickHouse HTTP connection settings.
#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    /// Base URL of the ClickHouse HTTP interface, e.g. `http://localhost:8123`.
    pub url: String,
    /// ClickHouse user.
    pub username: String,
    /// ClickHouse password.
    pub password: Option<String>,
    /// Default database for statements.
    pub database: Option<String>,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            username: "default".to_string(),
            password: None,
            database: None,
        }
    }
}

/// Configuration shared by all services.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name of the running service (used in logs and responses).
    pub service_name: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Timeout for outbound HTTP requests, in seconds.
    pub request_timeout_secs: u64,
    /// ClickHouse connection.
    pub clickhouse: ClickHouseConfig,
    /// sqlx connection URL for the tab store.
    pub tab_store_url: String,
    /// Reject statements that take the command path.
    pub read_only: bool,
    /// Access token required by the gateway; `None` disables authentication.
    pub api_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "ch-ui".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            clickhouse: ClickHouseConfig::default(),
            tab_store_url: "sqlite:ch-ui-tabs.db?mode=rwc".to_string(),
            read_only: false,
            api_token: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from the environment for the named service.
    /// `default_port` applies when `SERVER_PORT` is not set.
    pub fn load_with_service(service_name: &str, default_port: u16) -> Self {
        Self::from_env(&EnvVars::load(), service_name, default_port)
    }

    fn from_env(env: &EnvVars, service_name: &str, default_port: u16) -> Self {
        let defaults = Self::default();

        Self {
            service_name: service_name.to_string(),
            host: env.get_or("SERVER_HOST", defaults.host),
            port: env.parse("SERVER_PORT").unwrap_or(default_port),
            request_timeout_secs: env
                .parse("REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout_secs),
            clickhouse: ClickHouseConfig {
                url: env.get_or("CLICKHOUSE_URL", defaults.clickhouse.url),
                username: env.get_or("CLICKHOUSE_USER", defaults.clickhouse.username),
                password: env.get("CLICKHOUSE_PASSWORD"),
                database: env.get("CLICKHOUSE_DATABASE"),
            },
            tab_store_url: env.get_or("TAB_STORE_URL", defaults.tab_store_url),
            read_only: env.get("READ_ONLY").map(|v| parse_bool(&v)).unwrap_or(false),
            api_token: env.get("API_TOKEN"),
        }
    }

    /// Outbound request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Addresses of the downstream services.
#[derive(Debug, Clone)]
pub struct ServiceUrls {
    /// Base URL of the query service.
    pub query_service: String,
}

impl ServiceUrls {
    /// Loads service URLs from the environment.
    pub fn load() -> Self {
        Self::from_env(&EnvVars::load())
    }

    fn from_env(env: &EnvVars) -> Self {
        Self {
            query_service: env
                .get_or("QUERY_SERVICE_URL", "http://127.0.0.1:8082".to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

/// Process environment with `.env` fallbacks.
#[derive(Debug, Default)]
struct EnvVars {
    dotenv: HashMap<String, String>,
}

impl EnvVars {
    /// Reads `.env` from the working directory; a missing file is fine.
    fn load() -> Self {
        let dotenv = std::fs::read_to_string(".env")
            .map(|content| parse_dotenv(&content))
            .unwrap_or_default();
        Self { dotenv }
    }

    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .or_else(|| self.dotenv.get(key).cloned())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_or(&self, key: &str, default: String) -> String {
        self.get(key).unwrap_or(default)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }
}

/// Parses `KEY=value` lines; blank lines and `#` comments are skipped.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let key = key.trim().trim_start_matches("export ").trim();
            (key.to_string(), value.trim().trim_matches('"').to_string())
        })
        .collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("ON"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("nope"));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.clickhouse.url, "http://localhost:8123");
        assert_eq!(config.clickhouse.username, "default");
        assert!(!config.read_only);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_dotenv() {
        let vars = parse_dotenv("# local\n\nCLICKHOUSE_URL=\"http://ch:8123\"\nexport READ_ONLY = yes\nbroken line\n");
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["CLICKHOUSE_URL"], "http://ch:8123");
        assert_eq!(vars["READ_ONLY"], "yes");
    }

    #[test]
    fn test_dotenv_values_fill_unset_variables() {
        let env = EnvVars {
            dotenv: parse_dotenv(
                "CH_UI_CONFIG_TEST_PORT=9000\nCH_UI_CONFIG_TEST_EMPTY=\nPATH=/from/dotenv",
            ),
        };
        assert_eq!(env.parse::<u16>("CH_UI_CONFIG_TEST_PORT"), Some(9000));
        assert_eq!(env.get("CH_UI_CONFIG_TEST_EMPTY"), None);
        assert_eq!(env.get("CH_UI_CONFIG_TEST_MISSING"), None);
        if let Ok(path) = std::env::var("PATH") {
            assert_eq!(env.get("PATH"), Some(path.trim().to_string()));
        }
    }

    #[test]
    fn test_default_port_applies_without_server_port() {
        let env = EnvVars::default();
        if std::env::var("SERVER_PORT").is_err() {
            let config = AppConfig::from_env(&env, "query-service", 8082);
            assert_eq!(config.port, 8082);
            assert_eq!(config.service_name, "query-service");
        }
    }
}
