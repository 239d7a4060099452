//! Gateway configuration loaded from environment variables.
//!
//! All settings come from the environment (or a `.env` file via `dotenvy`).
//! Unset or unparsable values fall back to defaults, except `LISTEN_ADDR`,
//! which must parse if it is set.

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Milliseconds a single publication may wait on one slow connection
    /// before that connection is evicted.
    pub delivery_timeout_ms: u64,

    /// Seconds between heartbeat publications.
    pub heartbeat_interval_secs: u64,

    /// Capacity of the inbound publication bus queue.
    pub queue_capacity: usize,

    /// Whether event streams send SSE comment keep-alives.
    pub keep_alive_enabled: bool,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        Ok(Self {
            listen_addr,
            delivery_timeout_ms: parse_env("NOTIFY_DELIVERY_TIMEOUT_MS", 10_000),
            heartbeat_interval_secs: parse_env("NOTIFY_HEARTBEAT_INTERVAL_SECS", 60),
            queue_capacity: parse_env("NOTIFY_QUEUE_CAPACITY", 64),
            keep_alive_enabled: parse_env_bool("STREAM_KEEP_ALIVE_ENABLED", true),
        })
    }

    /// Settings consumed by the notification core.
    ///
    /// Zero durations and capacity are raised to 1 ms, 1 s and 1.
    #[must_use]
    pub fn notify_config(&self) -> NotifyConfig {
        NotifyConfig {
            delivery_timeout: Duration::from_millis(self.delivery_timeout_ms.max(1)),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            queue_capacity: self.queue_capacity.max(1),
            keep_alive: self.keep_alive_enabled,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            delivery_timeout_ms: 10_000,
            heartbeat_interval_secs: 60,
            queue_capacity: 64,
            keep_alive_enabled: true,
        }
    }
}

/// Notification core settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyConfig {
    /// Per-recipient delivery timeout.
    pub delivery_timeout: Duration,
    /// Heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Bus queue capacity (at least 1).
    pub queue_capacity: usize,
    /// SSE keep-alive comments on event streams.
    pub keep_alive: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        GatewayConfig::default().notify_config()
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let notify = NotifyConfig::default();
        assert_eq!(notify.delivery_timeout, Duration::from_secs(10));
        assert_eq!(notify.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(notify.queue_capacity, 64);
        assert!(notify.keep_alive);
    }

    #[test]
    fn zero_settings_are_raised_to_minimums() {
        let config = GatewayConfig {
            delivery_timeout_ms: 0,
            heartbeat_interval_secs: 0,
            queue_capacity: 0,
            ..GatewayConfig::default()
        };
        let notify = config.notify_config();
        assert_eq!(notify.delivery_timeout, Duration::from_millis(1));
        assert_eq!(notify.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(notify.queue_capacity, 1);
    }

    #[test]
    fn missing_variables_fall_back() {
        assert_eq!(parse_env("MARINA_TEST_UNSET_NUMBER", 7_u64), 7);
        assert!(parse_env_bool("MARINA_TEST_UNSET_BOOL", true));
        assert!(!parse_env_bool("MARINA_TEST_UNSET_BOOL", false));
    }
}
