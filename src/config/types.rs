//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Listener settings
    pub server: ServerConfig,

    /// Load balancer settings
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,

    /// Backend definitions (upstream servers)
    #[serde(default)]
    pub backends: Vec<BackendConfig>,

    /// Rate limiting settings
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

/// Load balancer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadBalancerConfig {
    /// Balancing strategy name (must be registered)
    #[serde(default = "default_method")]
    pub method: String,

    /// How often to probe backend health
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub health_check_interval: Duration,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            health_check_interval: default_health_interval(),
        }
    }
}

/// Individual backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique identifier for this backend
    pub id: String,

    /// Backend host name or address
    pub host: String,

    /// Backend port
    pub port: u16,

    /// Timeout for establishing the upstream connection
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout for the upstream response headers
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Maximum idle connections kept to this backend
    #[serde(default = "default_max_connection")]
    pub max_connection: usize,

    /// Whether this backend participates in the pool
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Whether per-client rate limiting is enforced
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tokens added per second for clients without an override
    #[serde(default = "default_rate")]
    pub default_rate: f64,

    /// Bucket capacity for clients without an override
    #[serde(default = "default_burst")]
    pub default_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_rate: default_rate(),
            default_burst: default_burst(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Deployment environment ("production" enables JSON output)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_method() -> String {
    "RoundRobin".to_string()
}

fn default_health_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_connection() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_rate() -> f64 {
    100.0
}

fn default_burst() -> u32 {
    50
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
server:
  port: 8080
backends:
  - id: b1
    host: 127.0.0.1
    port: 9001
"#,
        )
        .unwrap();

        assert_eq!(config.load_balancer.method, "RoundRobin");
        assert_eq!(
            config.load_balancer.health_check_interval,
            Duration::from_secs(10)
        );
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.default_rate, 100.0);
        assert_eq!(config.rate_limit.default_burst, 50);
        assert_eq!(config.logging.level, "info");
        assert!(config.backends[0].enabled);
    }

    #[test]
    fn test_duration_parsing() {
        let config: Config = serde_yaml::from_str(
            r#"
server:
  port: 8080
load_balancer:
  health_check_interval: 2s
backends:
  - id: b1
    host: 127.0.0.1
    port: 9001
    connect_timeout: 500ms
    read_timeout: 3s
"#,
        )
        .unwrap();

        assert_eq!(
            config.load_balancer.health_check_interval,
            Duration::from_secs(2)
        );
        assert_eq!(config.backends[0].connect_timeout, Duration::from_millis(500));
        assert_eq!(config.backends[0].read_timeout, Duration::from_secs(3));
    }
}
