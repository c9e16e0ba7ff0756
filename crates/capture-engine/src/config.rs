//! Engine configuration from environment variables.

use std::env;

use chrono::{Duration, FixedOffset, Local, Offset};

use crate::extract::DEFAULT_MAX_KEYWORDS;

/// Tunables for the router, export queue and extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Bound on the export queue; oldest queued jobs are evicted past it.
    pub max_queue_size: usize,
    /// Retry ladder. Attempt `n` waits `retry_delays[min(n, len - 1)]`.
    pub retry_delays: Vec<Duration>,
    /// Starts after which a job is permanently failed.
    pub max_attempts: u32,
    /// Age after which an undelivered job is permanently failed.
    pub job_ttl: Duration,
    /// How long a delivered dedupe key suppresses the same export.
    pub dedupe_window: Duration,
    /// Runners-up returned after the best match.
    pub max_alternatives: usize,
    /// Keywords kept per extracted topic.
    pub max_keywords: usize,
    /// Offset used to bucket captures into local calendar days.
    pub utc_offset: FixedOffset,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 50,
            retry_delays: vec![
                Duration::milliseconds(5_000),
                Duration::milliseconds(30_000),
                Duration::milliseconds(120_000),
            ],
            max_attempts: 3,
            job_ttl: Duration::hours(24),
            dedupe_window: Duration::hours(24),
            max_alternatives: 3,
            max_keywords: DEFAULT_MAX_KEYWORDS,
            utc_offset: Local::now().offset().fix(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `NLM_MAX_QUEUE_SIZE`: Queue bound (default: 50)
    /// - `NLM_RETRY_DELAYS_MS`: Comma-separated ladder (default: "5000,30000,120000")
    /// - `NLM_MAX_ATTEMPTS`: Attempts before failing (default: 3)
    /// - `NLM_JOB_TTL_HOURS`: Job lifetime (default: 24)
    /// - `NLM_DEDUPE_WINDOW_HOURS`: Dedupe window (default: 24)
    /// - `CAPTURE_MAX_ALTERNATIVES`: Alternatives per route (default: 3)
    /// - `CAPTURE_MAX_KEYWORDS`: Keywords per topic (default: 5)
    /// - `CAPTURE_UTC_OFFSET_MINUTES`: Local-day offset (default: host offset)
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

        let max_queue_size = match var("NLM_MAX_QUEUE_SIZE") {
            Some(v) => parse_positive("NLM_MAX_QUEUE_SIZE", &v)?,
            None => defaults.max_queue_size,
        };

        let retry_delays = match var("NLM_RETRY_DELAYS_MS") {
            Some(v) => parse_ladder("NLM_RETRY_DELAYS_MS", &v)?,
            None => defaults.retry_delays,
        };

        let max_attempts = match var("NLM_MAX_ATTEMPTS") {
            Some(v) => parse_positive::<u32>("NLM_MAX_ATTEMPTS", &v)?,
            None => defaults.max_attempts,
        };

        let job_ttl = match var("NLM_JOB_TTL_HOURS") {
            Some(v) => parse_hours("NLM_JOB_TTL_HOURS", &v)?,
            None => defaults.job_ttl,
        };

        let dedupe_window = match var("NLM_DEDUPE_WINDOW_HOURS") {
            Some(v) => parse_hours("NLM_DEDUPE_WINDOW_HOURS", &v)?,
            None => defaults.dedupe_window,
        };

        let max_alternatives = match var("CAPTURE_MAX_ALTERNATIVES") {
            Some(v) => v.trim().parse().map_err(|e| ConfigError::InvalidValue {
                name: "CAPTURE_MAX_ALTERNATIVES".to_string(),
                reason: format!("{}", e),
            })?,
            None => defaults.max_alternatives,
        };

        let max_keywords = match var("CAPTURE_MAX_KEYWORDS") {
            Some(v) => parse_positive("CAPTURE_MAX_KEYWORDS", &v)?,
            None => defaults.max_keywords,
        };

        let utc_offset = match var("CAPTURE_UTC_OFFSET_MINUTES") {
            Some(v) => parse_offset("CAPTURE_UTC_OFFSET_MINUTES", &v)?,
            None => defaults.utc_offset,
        };

        Ok(Self {
            max_queue_size,
            retry_delays,
            max_attempts,
            job_ttl,
            dedupe_window,
            max_alternatives,
            max_keywords,
            utc_offset,
        })
    }

    /// Delay before the retry that follows `attempts` starts.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        let idx = (attempts as usize).min(self.retry_delays.len().saturating_sub(1));
        self.retry_delays
            .get(idx)
            .copied()
            .unwrap_or_else(Duration::zero)
    }
}

fn parse_hours(name: &str, value: &str) -> Result<Duration, ConfigError> {
    let hours: i64 = parse_positive(name, value)?;
    Duration::try_hours(hours).ok_or_else(|| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: "out of range".to_string(),
    })
}

fn parse_positive<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let parsed: T = value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    if parsed <= T::default() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}

fn parse_ladder(name: &str, value: &str) -> Result<Vec<Duration>, ConfigError> {
    let ladder = value
        .split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: name.to_string(),
                    reason: format!("{:?}: {}", part, e),
                })
                .and_then(|ms| {
                    i64::try_from(ms)
                        .map(Duration::milliseconds)
                        .map_err(|e| ConfigError::InvalidValue {
                            name: name.to_string(),
                            reason: e.to_string(),
                        })
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if ladder.is_empty() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "retry ladder must not be empty".to_string(),
        });
    }
    Ok(ladder)
}

fn parse_offset(name: &str, value: &str) -> Result<FixedOffset, ConfigError> {
    let minutes: i32 = value.trim().parse().map_err(|e: std::num::ParseIntError| {
        ConfigError::InvalidValue {
            name: name.to_string(),
            reason: e.to_string(),
        }
    })?;
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("offset of {} minutes is out of range", minutes),
        })
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
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_queue_size, 50);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.job_ttl, Duration::hours(24));
        assert_eq!(config.dedupe_window, Duration::hours(24));
        assert_eq!(config.max_alternatives, 3);
        assert_eq!(config.max_keywords, 5);
        assert_eq!(
            config.retry_delays,
            vec![
                Duration::seconds(5),
                Duration::seconds(30),
                Duration::seconds(120)
            ]
        );
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("NLM_MAX_QUEUE_SIZE", "10"),
            ("NLM_RETRY_DELAYS_MS", "100, 200"),
            ("CAPTURE_MAX_ALTERNATIVES", "0"),
            ("CAPTURE_UTC_OFFSET_MINUTES", "420"),
        ]))
        .unwrap();
        assert_eq!(config.max_queue_size, 10);
        assert_eq!(
            config.retry_delays,
            vec![Duration::milliseconds(100), Duration::milliseconds(200)]
        );
        assert_eq!(config.max_alternatives, 0);
        assert_eq!(config.utc_offset.local_minus_utc(), 7 * 3600);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_lookup(lookup(&[("NLM_MAX_QUEUE_SIZE", "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("NLM_MAX_ATTEMPTS", "many")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("NLM_RETRY_DELAYS_MS", ",,")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("NLM_RETRY_DELAYS_MS", "5s")])).is_err());
        assert!(
            EngineConfig::from_lookup(lookup(&[("CAPTURE_UTC_OFFSET_MINUTES", "100000")]))
                .is_err()
        );
        let huge = i64::MAX.to_string();
        assert!(EngineConfig::from_lookup(lookup(&[("NLM_JOB_TTL_HOURS", huge.as_str())])).is_err());
        assert!(
            EngineConfig::from_lookup(lookup(&[("NLM_DEDUPE_WINDOW_HOURS", huge.as_str())]))
                .is_err()
        );
    }

    #[test]
    fn test_retry_delay_clamps_to_last_rung() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_delay(0), Duration::seconds(5));
        assert_eq!(config.retry_delay(1), Duration::seconds(30));
        assert_eq!(config.retry_delay(2), Duration::seconds(120));
        assert_eq!(config.retry_delay(9), Duration::seconds(120));
    }
}
