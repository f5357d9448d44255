//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use event_bus::RetryPolicy;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset selects in-memory stores and bus
/// - `BUS_MAX_ATTEMPTS`: deliveries before dead-lettering (default: `5`)
/// - `BUS_RETRY_BACKOFF_MS`: first redelivery delay (default: `500`)
/// - `WORKER_POLL_INTERVAL_MS`: idle consumer poll interval (default: `200`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub bus_max_attempts: u32,
    pub bus_retry_backoff_ms: u64,
    pub worker_poll_interval_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            bus_max_attempts: parsed(&lookup, "BUS_MAX_ATTEMPTS")
                .filter(|&n: &u32| n > 0)
                .unwrap_or(defaults.bus_max_attempts),
            bus_retry_backoff_ms: parsed(&lookup, "BUS_RETRY_BACKOFF_MS")
                .unwrap_or(defaults.bus_retry_backoff_ms),
            worker_poll_interval_ms: parsed(&lookup, "WORKER_POLL_INTERVAL_MS")
                .unwrap_or(defaults.worker_poll_interval_ms),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Redelivery policy for the bus.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.bus_max_attempts,
            Duration::from_millis(self.bus_retry_backoff_ms),
        )
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            bus_max_attempts: 5,
            bus_retry_backoff_ms: 500,
            worker_poll_interval_ms: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.database_url, None);
        assert_eq!(config.bus_max_attempts, 5);
        assert_eq!(config.worker_poll_interval(), Duration::from_millis(200));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_reads_overrides() {
        let config = from_pairs(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/harvests"),
            ("BUS_MAX_ATTEMPTS", "3"),
            ("BUS_RETRY_BACKOFF_MS", "50"),
            ("WORKER_POLL_INTERVAL_MS", " 25 "),
        ]);
        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/harvests")
        );

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_backoff, Duration::from_millis(50));
        assert_eq!(config.worker_poll_interval(), Duration::from_millis(25));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("BUS_MAX_ATTEMPTS", "0"),
            ("DATABASE_URL", "  "),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.bus_max_attempts, 5);
        assert_eq!(config.database_url, None);
    }
}
