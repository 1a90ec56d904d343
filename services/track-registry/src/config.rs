//! Configuration for the track service.
//!
//! Loaded from environment variables (and a `.env` file, read by `main`)
//! with defaults for local development.

use serde::{Deserialize, Serialize};
use std::env;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// `PostgreSQL` settings; tracks are kept in memory when absent
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
    /// | `PORT` | `3001` |
    /// | `DATABASE_URL` | unset (in-memory store) |
    /// | `DATABASE_MAX_CONNECTIONS` | `10` |
    /// | `METRICS_ENABLED` | `true` |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_source(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server: ServerConfig {
                host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: var("PORT").and_then(|s| s.parse().ok()).unwrap_or(3001),
            },
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
}
