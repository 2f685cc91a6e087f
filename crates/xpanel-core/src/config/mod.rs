//! Panel configuration.
//!
//! Loaded from `xpanel.toml`. Every key is optional; a missing file yields
//! the defaults.

pub mod parser;
pub mod paths;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use parser::{parse_panel_toml, parse_panel_toml_str};
pub use paths::{default_config_path, default_data_dir};

/// Default file name of the panel database inside the data directory.
pub const DEFAULT_DATABASE_FILE: &str = "panel.db.json";

/// Settings read from `xpanel.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Directory holding the panel database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Database file name, relative to `data_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Tracing filter directive, used when `RUST_LOG` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,

    /// JSON file used as the template until one has been stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_template: Option<PathBuf>,
}

fn default_database_file() -> String {
    DEFAULT_DATABASE_FILE.to_string()
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_file: default_database_file(),
            log_filter: None,
            default_template: None,
        }
    }
}

impl PanelConfig {
    /// Load the config at `path`, or the defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        parse_panel_toml(path)
    }

    /// Load from [`default_config_path`].
    pub fn load_default() -> Result<Self> {
        Self::load(&default_config_path()?)
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.database_file.trim();
        if name.is_empty() {
            anyhow::bail!("database_file must not be empty");
        }
        if name.contains('/') || name.contains('\\') {
            anyhow::bail!(
                "database_file must be a file name, not a path: {}",
                self.database_file
            );
        }
        if let Some(filter) = &self.log_filter
            && filter.trim().is_empty()
        {
            anyhow::bail!("log_filter must not be empty when set");
        }
        Ok(())
    }

    /// The configured data directory, or the platform default.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    /// Full path of the database file.
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.resolved_data_dir()?.join(&self.database_file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = PanelConfig::default();
        assert_eq!(config.database_file, DEFAULT_DATABASE_FILE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn database_file_must_be_a_plain_name() {
        let mut config = PanelConfig::default();

        config.database_file = "  ".to_string();
        assert!(config.validate().is_err());

        config.database_file = "nested/panel.json".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn database_path_joins_data_dir() {
        let config = PanelConfig {
            data_dir: Some(PathBuf::from("/var/lib/xpanel")),
            ..Default::default()
        };
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/var/lib/xpanel/panel.db.json")
        );
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = PanelConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, PanelConfig::default());
    }
}
