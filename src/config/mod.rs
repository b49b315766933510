//! Application configuration management

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::loaders::LoaderConfig;
use crate::user::ActivationConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Base URL used in emailed links
    pub host_url: String,

    /// SQLite database path or `sqlite://` URL
    pub database_url: String,

    /// Connection pool size
    pub database_max_connections: u32,

    /// Registration needs an invite key
    pub require_invite: bool,

    /// Registration needs email activation
    pub require_activation: bool,

    /// Pending activation time-to-live, in seconds
    pub activation_expiry_secs: i64,

    /// Settle delay before a loader dispatches its batch
    pub loader_wait_ms: u64,

    /// Maximum keys per batched fetch
    pub loader_max_batch: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any name -> value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let flag = |name: &str, default: bool| {
            lookup(name)
                .map(|v| v == "true" || v == "1")
                .unwrap_or(default)
        };

        // Prefer DATABASE_PATH, fall back to DATABASE_URL
        let database_url = lookup("DATABASE_PATH")
            .or_else(|| lookup("DATABASE_URL"))
            .unwrap_or_else(|| "./data/stashbox.db".to_string());

        Ok(Self {
            port: var("PORT", "9998").parse().context("Invalid PORT")?,

            host_url: var("HOST_URL", "http://localhost:9998"),

            database_url,

            database_max_connections: var("DATABASE_MAX_CONNECTIONS", "10")
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,

            require_invite: flag("REQUIRE_INVITE", true),

            require_activation: flag("REQUIRE_ACTIVATION", true),

            activation_expiry_secs: var("ACTIVATION_EXPIRY_SECS", "7200")
                .parse()
                .context("Invalid ACTIVATION_EXPIRY_SECS")?,

            loader_wait_ms: var("LOADER_WAIT_MS", "1")
                .parse()
                .context("Invalid LOADER_WAIT_MS")?,

            loader_max_batch: var("LOADER_MAX_BATCH", "500")
                .parse()
                .context("Invalid LOADER_MAX_BATCH")?,
        })
    }

    /// sqlx connection URL for the configured database
    pub fn sqlite_url(&self) -> String {
        if self.database_url.starts_with("sqlite:") {
            self.database_url.clone()
        } else {
            format!("sqlite://{}", self.database_url)
        }
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            wait: Duration::from_millis(self.loader_wait_ms),
            max_batch: self.loader_max_batch,
        }
    }

    pub fn activation_config(&self) -> ActivationConfig {
        ActivationConfig {
            require_invite: self.require_invite,
            require_activation: self.require_activation,
            expiry: chrono::Duration::seconds(self.activation_expiry_secs),
            host_url: self.host_url.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(database_url: &str) -> Config {
        Config {
            port: 9998,
            host_url: "http://localhost:9998".to_string(),
            database_url: database_url.to_string(),
            database_max_connections: 10,
            require_invite: true,
            require_activation: false,
            activation_expiry_secs: 60,
            loader_wait_ms: 0,
            loader_max_batch: 25,
        }
    }

    #[test]
    fn paths_become_sqlite_urls() {
        assert_eq!(config("./data/x.db").sqlite_url(), "sqlite://./data/x.db");
        assert_eq!(config("sqlite::memory:").sqlite_url(), "sqlite::memory:");
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 9998);
        assert_eq!(config.database_url, "./data/stashbox.db");
        assert_eq!(config.loader_wait_ms, 1);
        assert_eq!(config.loader_max_batch, 500);
        assert!(config.require_invite);
    }

    #[test]
    fn invalid_loader_settings_are_rejected() {
        let err = Config::from_lookup(lookup(&[("LOADER_WAIT_MS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("LOADER_WAIT_MS"));

        let err = Config::from_lookup(lookup(&[("LOADER_MAX_BATCH", "-3")])).unwrap_err();
        assert!(err.to_string().contains("LOADER_MAX_BATCH"));
    }

    #[test]
    fn loader_settings_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("LOADER_WAIT_MS", "0"),
            ("LOADER_MAX_BATCH", "64"),
            ("REQUIRE_INVITE", "false"),
        ]))
        .unwrap();
        assert!(config.loader_config().wait.is_zero());
        assert_eq!(config.loader_config().max_batch, 64);
        assert!(!config.require_invite);
    }

    #[test]
    fn derived_configs() {
        let config = config("x.db");
        assert_eq!(config.loader_config().max_batch, 25);
        assert!(config.loader_config().wait.is_zero());

        let activation = config.activation_config();
        assert_eq!(activation.expiry, chrono::Duration::seconds(60));
        assert!(!activation.require_activation);
    }
}
