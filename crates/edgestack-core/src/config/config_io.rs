//! Configuration loading and path resolution.
//!
//! Focuses on I/O and filesystem-related helpers for config management.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use super::config_env::read_env_overrides;
use super::InstallerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFailed(String),
    #[error("failed to parse config: {0}")]
    ParseFailed(String),
    #[error("invalid endpoint {name}: {reason}")]
    InvalidEndpoint { name: &'static str, reason: String },
    #[error("poll timings for {0} must satisfy retry < progress < timeout")]
    InvalidPolling(&'static str),
    #[error("missing $HOME, unable to resolve config directory")]
    MissingHome,
}

impl InstallerConfig {
    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|err| ConfigError::ReadFailed(err.to_string()))?;
        let mut config = Self::parse(&contents)?;
        config.overrides = read_env_overrides();
        Ok(config)
    }

    /// Load configuration from the default XDG config location, if present.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_config_path()?;
        if !path.exists() {
            let mut config = Self::default();
            config.overrides = read_env_overrides();
            return Ok(config);
        }
        Self::load_from_path(&path)
    }

    /// Parse and validate TOML contents without touching the environment.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: InstallerConfig =
            toml::from_str(contents).map_err(|err| ConfigError::ParseFailed(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("register_domain_url", &self.endpoints.register_domain_url)?;
        check_url("metrics_url", &self.endpoints.metrics_url)?;
        check_url("chart_repo", &self.install.chart_repo)?;
        if !self.polling.fast.is_ordered() {
            return Err(ConfigError::InvalidPolling("fast"));
        }
        if !self.polling.slow.is_ordered() {
            return Err(ConfigError::InvalidPolling("slow"));
        }
        Ok(())
    }

    /// Chart repository after applying the `AES_HELM_REPO` override.
    pub fn chart_repo(&self) -> &str {
        self.overrides
            .helm_repo
            .as_deref()
            .unwrap_or(&self.install.chart_repo)
    }

    /// Return the default config directory based on XDG or $HOME.
    pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg).join("edgestack"));
        }
        let home = env::var("HOME").map_err(|_| ConfigError::MissingHome)?;
        Ok(PathBuf::from(home).join(".config").join("edgestack"))
    }

    /// Return the default config file path.
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::default_config_dir()?.join("install.toml"))
    }
}

fn check_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|err| ConfigError::InvalidEndpoint {
            name,
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PollTimings;

    #[test]
    fn empty_file_uses_defaults() {
        let config = InstallerConfig::parse("").expect("parse");
        assert_eq!(config.install.namespace, "ambassador");
        assert_eq!(config.polling.fast, PollTimings::FAST);
        assert_eq!(config.polling.slow, PollTimings::SLOW);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config = InstallerConfig::parse(
            r#"
            [install]
            namespace = "edge"

            [install.values]
            "service.type" = "NodePort"

            [polling.slow]
            retry_ms = 1000
            progress_ms = 5000
            timeout_ms = 60000
            "#,
        )
        .expect("parse");
        assert_eq!(config.install.namespace, "edge");
        assert_eq!(config.install.chart_name, "ambassador");
        assert_eq!(config.polling.slow.timeout_ms, 60_000);

        let values = config.install.chart_values();
        assert_eq!(values.get("namespace.name").map(String::as_str), Some("edge"));
        assert_eq!(values.get("service.type").map(String::as_str), Some("NodePort"));
    }

    #[test]
    fn partial_polling_table_fills_from_its_own_preset() {
        let config = InstallerConfig::parse(
            r#"
            [polling.slow]
            retry_ms = 1000

            [polling.fast]
            timeout_ms = 90000
            "#,
        )
        .expect("parse");
        assert_eq!(config.polling.slow.retry_ms, 1_000);
        assert_eq!(config.polling.slow.progress_ms, PollTimings::SLOW.progress_ms);
        assert_eq!(config.polling.slow.timeout_ms, PollTimings::SLOW.timeout_ms);
        assert_eq!(config.polling.fast.retry_ms, PollTimings::FAST.retry_ms);
        assert_eq!(config.polling.fast.timeout_ms, 90_000);
    }

    #[test]
    fn rejects_unordered_poll_timings() {
        let err = InstallerConfig::parse(
            r#"
            [polling.fast]
            retry_ms = 20000
            progress_ms = 15000
            timeout_ms = 120000
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPolling("fast")));
    }

    #[test]
    fn rejects_malformed_endpoint() {
        let err = InstallerConfig::parse(
            r#"
            [endpoints]
            metrics_url = "not a url"
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEndpoint {
                name: "metrics_url",
                ..
            }
        ));
    }

    #[test]
    fn helm_repo_override_wins() {
        let mut config = InstallerConfig::default();
        assert_eq!(config.chart_repo(), crate::InstallConfig::DEFAULT_CHART_REPO);
        config.overrides.helm_repo = Some("https://charts.example.com".to_string());
        assert_eq!(config.chart_repo(), "https://charts.example.com");
    }
}
