//! Configuration management for tanglesd
//!
//! Defaults come from the constants below, overlaid with `TANGLES_*`
//! environment variables (a `.env` file is loaded by `main`), overlaid with
//! command-line flags.

use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tangles_ingest::{FilestoreConfig, ListenerConfig};

// ============================================================================
// Daemon Configuration Constants
// ============================================================================

/// Default number of concurrent pipeline invocations
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Default per-attempt timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default attempts per source, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between redeliveries in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Default number of queued source references
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default updates feed checked by `tanglesd version`
pub const DEFAULT_UPDATES_FEED: &str = "https://gitlab.com/snippets/1735555/raw";

/// Default timeout for update feed requests in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub store: FilestoreConfig,
    pub max_in_flight: usize,
    /// Zero disables the per-attempt timeout
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub queue_capacity: usize,
    pub updates_feed: String,
    pub http_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            store: FilestoreConfig::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            updates_feed: DEFAULT_UPDATES_FEED.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl DaemonConfig {
    /// Load config from environment variables.
    ///
    /// Only parsing is checked here; call [`DaemonConfig::validate`] once
    /// command-line overrides have been applied.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            store: FilestoreConfig::from_env(),
            max_in_flight: env_or("TANGLES_MAX_IN_FLIGHT", defaults.max_in_flight)?,
            timeout_secs: env_or("TANGLES_TIMEOUT_SECS", defaults.timeout_secs)?,
            max_attempts: env_or("TANGLES_MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_delay_ms: env_or("TANGLES_RETRY_DELAY_MS", defaults.retry_delay_ms)?,
            queue_capacity: env_or("TANGLES_QUEUE_CAPACITY", defaults.queue_capacity)?,
            updates_feed: std::env::var("TANGLES_UPDATES_FEED").unwrap_or(defaults.updates_feed),
            http_timeout_secs: env_or("TANGLES_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
        };

        Ok(config)
    }

    pub fn with_store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.store.root = root.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(CliError::config("max in-flight must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(CliError::config("max attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            max_in_flight: self.max_in_flight,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CliError::config(format!("{key} must be a non-negative integer, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "TANGLES_STORE_ROOT",
        "TANGLES_MAX_IN_FLIGHT",
        "TANGLES_TIMEOUT_SECS",
        "TANGLES_MAX_ATTEMPTS",
        "TANGLES_UPDATES_FEED",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = DaemonConfig::from_env().unwrap();
        assert_eq!(config.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(config.updates_feed, DEFAULT_UPDATES_FEED);

        let listener = config.listener_config();
        assert_eq!(listener.timeout, Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)));
        assert_eq!(listener.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clear_env();
        std::env::set_var("TANGLES_STORE_ROOT", "/tmp/tangles-test");
        std::env::set_var("TANGLES_MAX_IN_FLIGHT", "2");
        std::env::set_var("TANGLES_TIMEOUT_SECS", "0");

        let config = DaemonConfig::from_env().unwrap();
        assert_eq!(config.store.root, PathBuf::from("/tmp/tangles-test"));
        assert_eq!(config.max_in_flight, 2);
        assert_eq!(config.listener_config().timeout, None);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_number_is_config_error() {
        clear_env();
        std::env::set_var("TANGLES_MAX_ATTEMPTS", "lots");

        let err = DaemonConfig::from_env().unwrap_err();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("TANGLES_MAX_ATTEMPTS")));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_zero_in_flight_rejected_by_validate() {
        clear_env();
        std::env::set_var("TANGLES_MAX_IN_FLIGHT", "0");

        let config = DaemonConfig::from_env().unwrap();
        assert!(matches!(config.validate(), Err(CliError::Config(_))));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_override_replaces_invalid_env_value() {
        clear_env();
        std::env::set_var("TANGLES_MAX_IN_FLIGHT", "0");

        let mut config = DaemonConfig::from_env().unwrap();
        config.max_in_flight = 2;
        assert!(config.validate().is_ok());

        clear_env();
    }
}
