//! Configuration types for Index Duel components.
//!
//! Values are populated by the server binary from CLI flags and environment
//! variables; the defaults here are the ones the service runs with.

use std::time::Duration;

/// PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            password: password.into(),
            max_connections: 5,
        }
    }
}

/// HTTP client configuration for upstream calls.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Refresh pipeline settings.
///
/// `api_url` is optional so that the server can serve reads without it; a
/// refresh cycle started without one fails with a configuration error.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub api_url: Option<String>,
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            batch_size: 10,
            batch_pause: Duration::from_secs(1),
        }
    }
}

/// Interval between periodic refresh cycles.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}
