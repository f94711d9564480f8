//! User configuration (`~/.salesboard/config.json`).
//!
//! Every field except `baseUrl` has a serde default, so a minimal config is
//! `{ "baseUrl": "https://store.example.com/api" }`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metrics::window::PeriodSelection;
use crate::sync::pagination::{FetchStrategy, PaginationConfig};
use crate::sync::retry::RetryPolicy;

/// Overrides the config location.
pub const CONFIG_ENV: &str = "SALESBOARD_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Seconds between automatic reloads. 0 disables the timer; manual
    /// refreshes still work.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub period: PeriodSelection,
    /// Where the snapshot writer mirrors the dashboard. Disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default = "RetryPolicy::phase_one")]
    pub phase1_retry: RetryPolicy,
    #[serde(default = "RetryPolicy::phase_two")]
    pub phase2_retry: RetryPolicy,
    #[serde(default)]
    pub sources: Sources,
}

/// One remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub endpoint: String,
    /// Fixed filter/projection string sent with every page request.
    #[serde(default)]
    pub query: String,
    pub page_size: usize,
    #[serde(default)]
    pub strategy: FetchStrategy,
}

impl SourceConfig {
    fn new(endpoint: &str, page_size: usize) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            query: String::new(),
            page_size,
            strategy: FetchStrategy::Conservative,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sources {
    #[serde(default = "default_advisors")]
    pub advisors: SourceConfig,
    #[serde(default = "default_clients")]
    pub clients: SourceConfig,
    #[serde(default = "default_reports")]
    pub reports: SourceConfig,
    #[serde(default = "default_registrations")]
    pub registrations: SourceConfig,
    #[serde(default = "default_messages")]
    pub messages: SourceConfig,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            advisors: default_advisors(),
            clients: default_clients(),
            reports: default_reports(),
            registrations: default_registrations(),
            messages: default_messages(),
        }
    }
}

impl Sources {
    /// (name, config) pairs, Phase 1 sources first.
    pub fn all(&self) -> [(&'static str, &SourceConfig); 5] {
        [
            ("advisors", &self.advisors),
            ("clients", &self.clients),
            ("reports", &self.reports),
            ("registrations", &self.registrations),
            ("messages", &self.messages),
        ]
    }
}

fn default_request_timeout_ms() -> u64 {
    7_000
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_advisors() -> SourceConfig {
    SourceConfig::new("advisors", 100)
}

fn default_clients() -> SourceConfig {
    SourceConfig::new("clients", 500)
}

fn default_reports() -> SourceConfig {
    SourceConfig::new("reports", 500)
}

fn default_registrations() -> SourceConfig {
    SourceConfig::new("registrations", 500)
}

fn default_messages() -> SourceConfig {
    SourceConfig {
        // Only the columns the metrics read; message bodies are large.
        query: "fields=ID_ASESOR,ID_CLIENTE,FECHA,DIRECCION".to_string(),
        strategy: FetchStrategy::Aggressive,
        ..SourceConfig::new("messages", 1_000)
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("baseUrl is empty".to_string()));
        }
        for (name, source) in self.sources.all() {
            if source.page_size == 0 {
                return Err(ConfigError::Invalid(format!("{}: pageSize must be positive", name)));
            }
            if source.endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{}: endpoint is empty", name)));
            }
        }
        if self.phase1_retry.max_attempts == 0 || self.phase2_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry maxAttempts must be positive".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("requestTimeoutMs must be positive".to_string()));
        }
        let pagination = &self.pagination;
        for (field, value) in [
            ("requestTimeoutMs", pagination.request_timeout_ms),
            ("maxPages", pagination.max_pages as u64),
            ("maxParallelPages", pagination.max_parallel_pages as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("pagination.{} must be positive", field)));
            }
        }
        Ok(())
    }
}

/// `$SALESBOARD_CONFIG`, else `~/.salesboard/config.json`.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".salesboard").join("config.json"))
}

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let file = write_config(r#"{ "baseUrl": "https://store.example.com/api" }"#);
        let config = load_config_from(file.path()).unwrap();

        assert_eq!(config.request_timeout_ms, 7_000);
        assert_eq!(config.refresh_interval_secs, 300);
        assert_eq!(config.period, PeriodSelection::Month);
        assert_eq!(config.phase1_retry, RetryPolicy::phase_one());
        assert_eq!(config.phase2_retry.max_attempts, 2);
        assert_eq!(config.sources.clients.page_size, 500);
        assert_eq!(config.sources.messages.strategy, FetchStrategy::Aggressive);
        assert!(config.sources.messages.query.contains("DIRECCION"));
        assert_eq!(config.pagination, PaginationConfig::default());
    }

    #[test]
    fn test_partial_source_override_keeps_other_defaults() {
        let file = write_config(
            r#"{
                "baseUrl": "https://store.example.com/api",
                "period": { "period": "week" },
                "sources": { "reports": { "endpoint": "tbl_reports", "pageSize": 250 } }
            }"#,
        );
        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.period, PeriodSelection::Week);
        assert_eq!(config.sources.reports.endpoint, "tbl_reports");
        assert_eq!(config.sources.reports.strategy, FetchStrategy::Conservative);
        assert_eq!(config.sources.advisors.page_size, 100);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from(&dir.path().join("config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_parse_error() {
        let file = write_config("{ not json");
        assert!(matches!(load_config_from(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let file = write_config(
            r#"{ "baseUrl": "http://x", "sources": { "clients": { "endpoint": "clients", "pageSize": 0 } } }"#,
        );
        assert!(matches!(load_config_from(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_pagination_limits_are_rejected() {
        for field in ["requestTimeoutMs", "maxPages", "maxParallelPages"] {
            let file = write_config(&format!(
                r#"{{ "baseUrl": "http://x", "pagination": {{ "{}": 0 }} }}"#,
                field
            ));
            match load_config_from(file.path()) {
                Err(ConfigError::Invalid(msg)) => assert!(msg.contains(field), "{}", msg),
                other => panic!("{}: expected Invalid, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_empty_base_url_is_rejected() {
        let file = write_config(r#"{ "baseUrl": "  " }"#);
        assert!(matches!(load_config_from(file.path()), Err(ConfigError::Invalid(_))));
    }
}
