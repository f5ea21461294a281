use std::time::Duration;

use chrono::{FixedOffset, TimeDelta};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Saved listing pages can be large; 10 MiB.
const DEFAULT_UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

/// Tunables for the locate and harvest engine.
///
/// These are passed into the engine explicitly so tests can run it against
/// small synthetic galleries with tiny limits and no pacing delay.
#[derive(Debug, Clone)]
pub struct EngineLimits {
    /// Pages fetched concurrently per harvest batch.
    pub batch_size: usize,
    /// Page ceiling per gallery attempt.
    pub max_pages: u64,
    /// Maximum number of gallery attempts (the initial one included).
    pub max_hops: u32,
    /// Deepest page the exponential probe will request.
    pub probe_ceiling: u64,
    /// Pause between batches, and between the locate and harvest phases.
    pub batch_delay: Duration,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_pages: 1000,
            max_hops: 50,
            probe_ceiling: 20_000_000,
            batch_delay: Duration::from_millis(500),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Web Server
    pub web_host: String,
    pub web_port: u16,
    pub scrape_timeout: Duration,
    /// Body limit for uploaded listing pages.
    pub upload_limit: usize,

    // Upstream
    pub allowed_hosts: Vec<String>,
    pub major_base_url: String,
    pub minor_base_url: String,
    pub request_timeout: Duration,
    pub source_offset: FixedOffset,
    pub default_duration: TimeDelta,

    // Archive snapshots
    pub snapshot_enabled: bool,
    pub archive_api_url: String,
    pub snapshot_max_skew: TimeDelta,

    // Engine
    pub limits: EngineLimits,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let offset_minutes = parse_env_i32("SOURCE_UTC_OFFSET_MINUTES", 9 * 60)?;
        let source_offset =
            FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| ConfigError::InvalidValue {
                name: "SOURCE_UTC_OFFSET_MINUTES".to_string(),
                message: format!("{offset_minutes} is outside +/-24h"),
            })?;

        Ok(Self {
            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8080)?,
            scrape_timeout: Duration::from_secs(parse_env_u64("SCRAPE_TIMEOUT_SECS", 300)?),
            upload_limit: parse_env_usize("UPLOAD_LIMIT_BYTES", DEFAULT_UPLOAD_LIMIT)?,

            // Upstream
            allowed_hosts: parse_list(&env_or_default("ALLOWED_HOSTS", "dcinside.com")),
            major_base_url: env_or_default(
                "MAJOR_BASE_URL",
                "https://gall.dcinside.com/board/lists",
            ),
            minor_base_url: env_or_default(
                "MINOR_BASE_URL",
                "https://gall.dcinside.com/mgallery/board/lists",
            ),
            request_timeout: Duration::from_secs(parse_env_u64("REQUEST_TIMEOUT_SECS", 30)?),
            source_offset,
            default_duration: time_delta(
                "DEFAULT_DURATION_MINUTES",
                parse_env_u64("DEFAULT_DURATION_MINUTES", 60)?,
                TimeDelta::try_minutes,
            )?,

            // Archive snapshots
            snapshot_enabled: parse_env_bool("SNAPSHOT_ENABLED", true)?,
            archive_api_url: env_or_default(
                "ARCHIVE_API_URL",
                "https://archive.org/wayback/available",
            ),
            snapshot_max_skew: time_delta(
                "SNAPSHOT_MAX_SKEW_HOURS",
                parse_env_u64("SNAPSHOT_MAX_SKEW_HOURS", 48)?,
                TimeDelta::try_hours,
            )?,

            // Engine
            limits: EngineLimits {
                batch_size: parse_env_usize("BATCH_SIZE", 5)?,
                max_pages: parse_env_u64("MAX_PAGES", 1000)?,
                max_hops: parse_env_u32("MAX_HOPS", 50)?,
                probe_ceiling: parse_env_u64("PROBE_CEILING", 20_000_000)?,
                batch_delay: Duration::from_millis(parse_env_u64("BATCH_DELAY_MS", 500)?),
            },
        })
    }

    /// Configuration with small limits and no pacing, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            web_host: "127.0.0.1".to_string(),
            web_port: 0,
            scrape_timeout: Duration::from_secs(30),
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            allowed_hosts: vec!["dcinside.com".to_string()],
            major_base_url: "http://127.0.0.1:9/board/lists".to_string(),
            minor_base_url: "http://127.0.0.1:9/mgallery/board/lists".to_string(),
            request_timeout: Duration::from_secs(5),
            source_offset: FixedOffset::east_opt(9 * 3600).expect("valid offset"),
            default_duration: TimeDelta::minutes(60),
            snapshot_enabled: false,
            archive_api_url: "http://127.0.0.1:9/wayback/available".to_string(),
            snapshot_max_skew: TimeDelta::hours(48),
            limits: EngineLimits {
                batch_size: 2,
                max_pages: 50,
                max_hops: 5,
                probe_ceiling: 1000,
                batch_delay: Duration::ZERO,
            },
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "BATCH_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.limits.max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_PAGES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.limits.max_hops == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_HOPS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.limits.probe_ceiling < 10 {
            return Err(ConfigError::InvalidValue {
                name: "PROBE_CEILING".to_string(),
                message: "must be at least 10".to_string(),
            });
        }
        if self.allowed_hosts.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ALLOWED_HOSTS".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        for (name, value) in [
            ("MAJOR_BASE_URL", &self.major_base_url),
            ("MINOR_BASE_URL", &self.minor_base_url),
            ("ARCHIVE_API_URL", &self.archive_api_url),
        ] {
            if let Err(e) = url::Url::parse(value) {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_i32(name: &str, default: i32) -> Result<i32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

/// Convert an unsigned count of `unit`s into a duration, rejecting values chrono cannot hold.
fn time_delta(
    name: &str,
    value: u64,
    unit: fn(i64) -> Option<TimeDelta>,
) -> Result<TimeDelta, ConfigError> {
    i64::try_from(value)
        .ok()
        .and_then(unit)
        .ok_or_else(|| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("{value} is out of range"),
        })
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" dcinside.com, Example.ORG ,,"),
            vec!["dcinside.com".to_string(), "example.org".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_env_bool("NONEXISTENT_VAR", true).unwrap());
        assert!(!parse_env_bool("NONEXISTENT_VAR", false).unwrap());
    }

    #[test]
    fn test_testing_config_is_valid() {
        let config = Config::for_testing();
        assert!(config.validate().is_ok());
        assert_eq!(config.source_offset.local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = Config::for_testing();
        config.limits.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::for_testing();
        config.allowed_hosts.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_time_delta_rejects_out_of_range() {
        assert_eq!(
            time_delta("SNAPSHOT_MAX_SKEW_HOURS", 48, TimeDelta::try_hours).unwrap(),
            TimeDelta::hours(48)
        );
        assert!(matches!(
            time_delta("SNAPSHOT_MAX_SKEW_HOURS", u64::MAX, TimeDelta::try_hours),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            time_delta("DEFAULT_DURATION_MINUTES", i64::MAX as u64, TimeDelta::try_minutes),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_default_limits() {
        let limits = EngineLimits::default();
        assert_eq!(limits.batch_size, 5);
        assert_eq!(limits.max_hops, 50);
        assert_eq!(limits.probe_ceiling, 20_000_000);
    }
}
