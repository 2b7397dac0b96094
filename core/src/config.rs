//! List defaults, loadable from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sort::SortSpec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListConfig {
    /// Page size of the system default preference
    #[serde(default = "default_items_per_page")]
    pub default_items_per_page: u32,

    /// Upper bound accepted when a page size is saved
    #[serde(default = "default_max_items_per_page")]
    pub max_items_per_page: u32,

    /// Sort of list types that do not declare their own
    #[serde(default = "default_sort")]
    pub default_sort: SortSpec,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self { default_items_per_page: default_items_per_page(), max_items_per_page: default_max_items_per_page(), default_sort: default_sort() }
    }
}

fn default_items_per_page() -> u32 { 25 }
fn default_max_items_per_page() -> u32 { 200 }
fn default_sort() -> SortSpec { SortSpec::desc("updated_at") }

impl ListConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: ListConfig = toml::from_str(source)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.max_items_per_page == 0 {
            return Err(ConfigError::Invalid("max_items_per_page must be positive".into()));
        }
        if self.default_items_per_page == 0 || self.default_items_per_page > self.max_items_per_page {
            return Err(ConfigError::Invalid(format!("default_items_per_page must be between 1 and {}", self.max_items_per_page)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ListConfig::from_toml_str("").unwrap();
        assert_eq!(config, ListConfig::default());
        assert_eq!(config.default_items_per_page, 25);
        assert_eq!(config.default_sort.to_string(), "-updated_at");
    }

    #[test]
    fn test_overrides_and_bounds() {
        let config = ListConfig::from_toml_str("default_items_per_page = 50\ndefault_sort = \"created_at\"").unwrap();
        assert_eq!(config.default_items_per_page, 50);
        assert!(!config.default_sort.descending);

        assert!(matches!(ListConfig::from_toml_str("default_items_per_page = 500"), Err(ConfigError::Invalid(_))));
        assert!(matches!(ListConfig::from_toml_str("default_items_per_page = \"ten\""), Err(ConfigError::Parse(_))));
    }
}
