//! Server configuration from environment variables.

use std::env;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Server port to listen on.
    pub port: u16,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// CORS allowed origins (comma-separated or "*" for all).
    pub cors_allowed_origins: String,
    /// Where delivered exports are POSTed. No worker runs without it.
    pub export_webhook_url: Option<String>,
    /// How often the export worker polls the queue.
    pub export_poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            log_level: "info".to_string(),
            cors_allowed_origins: "*".to_string(),
            export_webhook_url: None,
            export_poll_interval: Duration::from_millis(1000),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `PORT`: Server port (default: 3000)
    /// - `LOG_LEVEL`: Logging level (default: "info")
    /// - `CORS_ALLOWED_ORIGINS`: Allowed CORS origins (default: "*")
    /// - `EXPORT_WEBHOOK_URL`: Export destination; enables the export worker
    /// - `EXPORT_POLL_INTERVAL_MS`: Worker poll interval (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(v) => v.trim().parse().map_err(|e| ConfigError::InvalidValue {
                name: "PORT".to_string(),
                reason: format!("{}", e),
            })?,
            None => defaults.port,
        };

        let log_level = var("LOG_LEVEL").unwrap_or(defaults.log_level);

        let cors_allowed_origins =
            var("CORS_ALLOWED_ORIGINS").unwrap_or(defaults.cors_allowed_origins);

        let export_webhook_url = match var("EXPORT_WEBHOOK_URL") {
            Some(v) => {
                let v = v.trim().to_string();
                if !(v.starts_with("http://") || v.starts_with("https://")) {
                    return Err(ConfigError::InvalidValue {
                        name: "EXPORT_WEBHOOK_URL".to_string(),
                        reason: "must be an http(s) URL".to_string(),
                    });
                }
                Some(v)
            }
            None => None,
        };

        let export_poll_interval = match var("EXPORT_POLL_INTERVAL_MS") {
            Some(v) => match v.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                Ok(_) => {
                    return Err(ConfigError::InvalidValue {
                        name: "EXPORT_POLL_INTERVAL_MS".to_string(),
                        reason: "must be positive".to_string(),
                    });
                }
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        name: "EXPORT_POLL_INTERVAL_MS".to_string(),
                        reason: format!("{}", e),
                    });
                }
            },
            None => defaults.export_poll_interval,
        };

        Ok(Self {
            port,
            log_level,
            cors_allowed_origins,
            export_webhook_url,
            export_poll_interval,
        })
    }

    /// Get the socket address for the server.
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid environment variable value.
    #[error("invalid value for environment variable {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.cors_allowed_origins, "*");
        assert!(config.export_webhook_url.is_none());
        assert_eq!(config.export_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("LOG_LEVEL", "debug"),
            ("EXPORT_WEBHOOK_URL", "https://hooks.example/export"),
            ("EXPORT_POLL_INTERVAL_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.export_webhook_url.as_deref(),
            Some("https://hooks.example/export")
        );
        assert_eq!(config.export_poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ServerConfig::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("EXPORT_POLL_INTERVAL_MS", "0")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("EXPORT_WEBHOOK_URL", "ftp://x")])).is_err());
    }
}
