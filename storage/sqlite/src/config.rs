//! Storage configuration, loadable from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tabula_core::error::ConfigError;
use tabula_core::ListConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file. An in-memory database is used when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum pooled connections (file databases only)
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a connection waits on a locked database before failing with SQLITE_BUSY
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Attempts for a preference write that still hits SQLITE_BUSY
    #[serde(default = "default_save_retries")]
    pub save_retries: u32,

    #[serde(default)]
    pub list: ListConfig,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            save_retries: default_save_retries(),
            list: ListConfig::default(),
        }
    }
}

fn default_pool_size() -> u32 { 10 }
fn default_busy_timeout_ms() -> u64 { 5000 }
fn default_save_retries() -> u32 { 3 }

impl SqliteConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self { Self { path: Some(path.into()), ..Self::default() } }

    pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: SqliteConfig = toml::from_str(source)?;
        config.check()?;
        Ok(config)
    }

    /// Bounds the engine relies on. Run on every load and again when the engine opens.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be positive".into()));
        }
        self.list.check()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> { Self::from_toml_str(&std::fs::read_to_string(path)?) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SqliteConfig::from_toml_str("").unwrap();
        assert_eq!(config, SqliteConfig::default());
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_nested_list_section() {
        let config = SqliteConfig::from_toml_str("path = \"lists.db\"\nsave_retries = 5\n\n[list]\ndefault_items_per_page = 10\n").unwrap();
        assert_eq!(config.path, Some(PathBuf::from("lists.db")));
        assert_eq!(config.save_retries, 5);
        assert_eq!(config.list.default_items_per_page, 10);
        assert_eq!(config.list.max_items_per_page, 200);

        assert!(SqliteConfig::from_toml_str("[list]\ndefault_items_per_page = 0\n").is_err());
    }

    #[test]
    fn test_check_rejects_zero_bounds() {
        assert!(matches!(SqliteConfig { pool_size: 0, ..SqliteConfig::default() }.check(), Err(ConfigError::Invalid(_))));

        let mut config = SqliteConfig::default();
        config.list.max_items_per_page = 0;
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));
        assert!(SqliteConfig::default().check().is_ok());
    }
}
