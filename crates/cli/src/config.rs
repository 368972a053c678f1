//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Directory holding stored baselines
    pub baseline_dir: Option<PathBuf>,
    /// Default output format
    pub default_format: Option<OutputFormat>,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Baseline directory: explicit flag, then config file, then the default
    pub fn baseline_dir(&self, override_dir: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(dir) = override_dir.or_else(|| self.baseline_dir.clone()) {
            return Ok(dir);
        }
        Ok(Self::config_dir()?.join("baselines"))
    }

    fn config_dir() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("loadscope"))
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("config.json")).unwrap();
        assert!(config.baseline_dir.is_none());
        assert!(config.default_format.is_none());
    }

    #[test]
    fn test_load_and_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"baseline_dir": "/srv/loadscope", "default_format": "json"}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(matches!(config.default_format, Some(OutputFormat::Json)));
        assert_eq!(
            config.baseline_dir(None).unwrap(),
            PathBuf::from("/srv/loadscope")
        );
        assert_eq!(
            config.baseline_dir(Some(PathBuf::from("/tmp/b"))).unwrap(),
            PathBuf::from("/tmp/b")
        );
    }
}
