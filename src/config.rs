//! Configuration module for the streaming client

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, StreamError};

const DEFAULT_ENDPOINTS: [&str; 2] = [
    "wss://ws.derivws.com/websockets/v3?app_id=1089",
    "wss://ws.binaryws.com/websockets/v3?app_id=1089",
];

/// Connection and retry settings for a [`StreamClient`](crate::StreamClient)
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Equivalent service addresses, tried round-robin on failure
    pub endpoints: Vec<String>,

    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,

    /// Interval between keepalive pings while open
    pub keepalive_interval: Duration,

    /// Default reply timeout for correlated requests
    pub request_timeout: Duration,

    /// Reply timeout for bulk history requests
    pub history_timeout: Duration,

    /// Reconnection settings
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub max_reconnect_attempts: u32,

    /// Buffer size of the lifecycle event broadcast channel
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Create a configuration for the given endpoints with default timings
    pub fn with_endpoints<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Load the client settings from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let endpoints: Vec<String> = env::var("STREAM_ENDPOINTS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.endpoints);

        Self {
            endpoints,
            connect_timeout: Duration::from_secs(env_or("CONNECT_TIMEOUT_SECS", 15)),
            keepalive_interval: Duration::from_secs(env_or("KEEPALIVE_INTERVAL_SECS", 30)),
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", 30)),
            history_timeout: Duration::from_secs(env_or("HISTORY_TIMEOUT_SECS", 20)),
            backoff_base: Duration::from_millis(env_or("BACKOFF_BASE_MS", 1000)),
            backoff_max: Duration::from_millis(env_or("BACKOFF_MAX_MS", 30_000)),
            max_reconnect_attempts: env_or("MAX_RECONNECT_ATTEMPTS", 10),
            event_capacity: env_or("EVENT_CAPACITY", 256),
        }
    }

    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(StreamError::Config("endpoint list is empty".to_string()));
        }
        if self.keepalive_interval.is_zero() {
            return Err(StreamError::Config(
                "keepalive interval must be non-zero".to_string(),
            ));
        }
        if self.connect_timeout.is_zero()
            || self.request_timeout.is_zero()
            || self.history_timeout.is_zero()
        {
            return Err(StreamError::Config("timeouts must be non-zero".to_string()));
        }
        if self.backoff_max < self.backoff_base {
            return Err(StreamError::Config(format!(
                "backoff_max ({:?}) is below backoff_base ({:?})",
                self.backoff_max, self.backoff_base
            )));
        }
        if self.event_capacity == 0 {
            return Err(StreamError::Config(
                "event capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            connect_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            history_timeout: Duration::from_secs(20),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            event_capacity: 256,
        }
    }
}

/// Application configuration for the `quote-stream` binary
#[derive(Debug, Clone)]
pub struct Config {
    /// Client connection settings
    pub client: ClientConfig,

    /// Symbols to stream ticks for (e.g., ["R_100", "R_50"])
    pub symbols: Vec<String>,

    /// Ticks of history to fetch per symbol on startup
    pub history_count: u32,

    /// Optional API token used to authorize the session
    pub api_token: Option<String>,

    /// Port for the health and metrics server
    pub health_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let symbols: Vec<String> = env::var("SYMBOLS")
            .unwrap_or_else(|_| "R_100,R_50".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let client = ClientConfig::from_env();
        client.validate()?;

        Ok(Self {
            client,
            symbols,
            history_count: env_or("HISTORY_COUNT", 500),
            api_token: env::var("API_TOKEN").ok().filter(|t| !t.is_empty()),
            health_port: env_or("HEALTH_PORT", 9090),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            symbols: vec!["R_100".to_string()],
            history_count: 500,
            api_token: None,
            health_port: 9090,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.history_timeout, Duration::from_secs(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_endpoints_rejected() {
        let config = ClientConfig::with_endpoints(Vec::<String>::new());
        assert!(matches!(config.validate(), Err(StreamError::Config(_))));
    }

    #[test]
    fn test_inverted_backoff_rejected() {
        let config = ClientConfig {
            backoff_base: Duration::from_secs(10),
            backoff_max: Duration::from_secs(1),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_endpoints_keeps_defaults() {
        let config = ClientConfig::with_endpoints(["ws://a", "ws://b"]);
        assert_eq!(config.endpoints, vec!["ws://a", "ws://b"]);
        assert_eq!(config.max_reconnect_attempts, 10);
    }
}
