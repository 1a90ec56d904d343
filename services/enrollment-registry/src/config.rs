//! Configuration for the enrollment service.
//!
//! Loaded from environment variables (and a `.env` file, read by `main`)
//! with defaults for local development.

use enrollment_coordinator::CallGuard;
use enrollment_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Where the Track service lives
    pub track_service: TrackServiceConfig,
    /// Retry and timeout budget for every store call
    pub calls: CallConfig,
    /// Seconds between background reconciliation passes (0 disables them)
    pub reconcile_interval_secs: u64,
    /// `PostgreSQL` settings; participants are kept in memory when absent
    pub database: Option<DatabaseConfig>,
    /// Serve Prometheus metrics at `GET /metrics`
    pub metrics_enabled: bool,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Track service client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackServiceConfig {
    /// Base URL, e.g. `http://localhost:3001`
    pub url: String,
    /// HTTP request timeout in milliseconds
    pub timeout_ms: u64,
}

/// Retry and timeout budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// First backoff in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,
    /// Backoff growth factor
    pub multiplier: f64,
    /// Limit on one attempt in milliseconds
    pub call_timeout_ms: u64,
}

/// `PostgreSQL` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL
    pub url: String,
    /// Pool size
    pub max_connections: u32,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `HOST` | `0.0.0.0` |
    /// | `PORT` | `3000` |
    /// | `SHUTDOWN_TIMEOUT` | `30` (seconds) |
    /// | `TRACK_SERVICE_URL` | `http://localhost:3001` |
    /// | `TRACK_SERVICE_TIMEOUT_MS` | `2000` |
    /// | `RETRY_MAX_RETRIES` | `3` |
    /// | `RETRY_INITIAL_DELAY_MS` | `50` |
    /// | `RETRY_MAX_DELAY_MS` | `1000` |
    /// | `RETRY_MULTIPLIER` | `2.0` |
    /// | `CALL_TIMEOUT_MS` | `2500` |
    /// | `RECONCILE_INTERVAL_SECS` | `30` |
    /// | `DATABASE_URL` | unset (in-memory stores) |
    /// | `DATABASE_MAX_CONNECTIONS` | `10` |
    /// | `METRICS_ENABLED` | `true` |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_source(var: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| var(key).and_then(|s| s.trim().parse::<u64>().ok());

        Self {
            server: ServerConfig {
                host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: var("PORT").and_then(|s| s.parse().ok()).unwrap_or(3000),
                shutdown_timeout: parsed("SHUTDOWN_TIMEOUT").unwrap_or(30),
            },
            track_service: TrackServiceConfig {
                url: var("TRACK_SERVICE_URL")
                    .unwrap_or_else(|| "http://localhost:3001".to_string()),
                timeout_ms: parsed("TRACK_SERVICE_TIMEOUT_MS").unwrap_or(2000),
            },
            calls: CallConfig {
                max_retries: var("RETRY_MAX_RETRIES")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
                initial_delay_ms: parsed("RETRY_INITIAL_DELAY_MS").unwrap_or(50),
                max_delay_ms: parsed("RETRY_MAX_DELAY_MS").unwrap_or(1000),
                multiplier: var("RETRY_MULTIPLIER")
                    .and_then(|s| s.parse().ok())
                    .filter(|m: &f64| m.is_finite() && *m >= 1.0)
                    .unwrap_or(2.0),
                call_timeout_ms: parsed("CALL_TIMEOUT_MS").unwrap_or(2500),
            },
            reconcile_interval_secs: parsed("RECONCILE_INTERVAL_SECS").unwrap_or(30),
            database: var("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .map(|url| DatabaseConfig {
                    url,
                    max_connections: var("DATABASE_MAX_CONNECTIONS")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(10),
                }),
            metrics_enabled: var("METRICS_ENABLED")
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        }
    }

    /// `host:port` to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Timeout and retry budget for coordinator and reconciler calls.
    #[must_use]
    pub fn call_guard(&self) -> CallGuard {
        let retry = RetryPolicy::builder()
            .max_retries(self.calls.max_retries)
            .initial_delay(Duration::from_millis(self.calls.initial_delay_ms))
            .max_delay(Duration::from_millis(self.calls.max_delay_ms))
            .multiplier(self.calls.multiplier)
            .build();
        CallGuard::new(retry, Duration::from_millis(self.calls.call_timeout_ms))
    }

    /// Track service HTTP timeout.
    #[must_use]
    pub const fn track_service_timeout(&self) -> Duration {
        Duration::from_millis(self.track_service.timeout_ms)
    }

    /// Interval of the background reconciler, `None` when disabled.
    #[must_use]
    pub const fn reconcile_interval(&self) -> Option<Duration> {
        match self.reconcile_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Graceful shutdown timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }
}
