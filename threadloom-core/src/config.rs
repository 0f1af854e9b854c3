//! Governance configuration.
//!
//! Limits, TTLs, and durations are gathered into one immutable struct that is
//! built once at start-up and handed to each component's constructor.

use std::time::Duration;

use crate::error::{ConfigError, ThreadloomError, ThreadloomResult};

/// Smallest post length the segmenter accepts.
pub const MIN_MAX_LENGTH: usize = 16;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Policy configuration shared by the cache, counter, and entitlement components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceConfig {
    /// Free generations per caller per UTC day.
    pub daily_limit: u32,
    /// Free generations per caller per UTC calendar month.
    pub monthly_limit: u32,
    /// Lifetime of a cached post sequence.
    pub cache_ttl: Duration,
    /// Length of premium access bought by one payment.
    pub entitlement_duration: Duration,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    /// How long applied grant ids are remembered for deduplication.
    pub grant_record_ttl: Duration,
    /// Extend a still-active entitlement instead of resetting it.
    pub entitlement_stacking: bool,
    /// Post length used when a caller does not pick one.
    pub default_max_length: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            daily_limit: 5,
            monthly_limit: 50,
            cache_ttl: DAY,
            entitlement_duration: DAY * 30,
            store_timeout: Duration::from_millis(250),
            grant_record_ttl: DAY * 90,
            entitlement_stacking: false,
            default_max_length: 280,
        }
    }
}

impl GovernanceConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `THREADLOOM_DAILY_LIMIT` (default: 5)
    /// - `THREADLOOM_MONTHLY_LIMIT` (default: 50)
    /// - `THREADLOOM_CACHE_TTL_SECS` (default: 86400)
    /// - `THREADLOOM_ENTITLEMENT_DAYS` (default: 30)
    /// - `THREADLOOM_STORE_TIMEOUT_MS` (default: 250)
    /// - `THREADLOOM_GRANT_RECORD_DAYS` (default: 90)
    /// - `THREADLOOM_ENTITLEMENT_STACKING`: "true" or "false" (default: false)
    /// - `THREADLOOM_DEFAULT_MAX_LENGTH` (default: 280)
    pub fn from_env() -> ThreadloomResult<Self> {
        let defaults = Self::default();

        let config = Self {
            daily_limit: env_parse("THREADLOOM_DAILY_LIMIT").unwrap_or(defaults.daily_limit),
            monthly_limit: env_parse("THREADLOOM_MONTHLY_LIMIT")
                .unwrap_or(defaults.monthly_limit),
            cache_ttl: env_parse("THREADLOOM_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            entitlement_duration: env_parse::<u32>("THREADLOOM_ENTITLEMENT_DAYS")
                .map(|days| DAY * days)
                .unwrap_or(defaults.entitlement_duration),
            store_timeout: env_parse("THREADLOOM_STORE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            grant_record_ttl: env_parse::<u32>("THREADLOOM_GRANT_RECORD_DAYS")
                .map(|days| DAY * days)
                .unwrap_or(defaults.grant_record_ttl),
            entitlement_stacking: std::env::var("THREADLOOM_ENTITLEMENT_STACKING")
                .ok()
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(defaults.entitlement_stacking),
            default_max_length: env_parse("THREADLOOM_DEFAULT_MAX_LENGTH")
                .unwrap_or(defaults.default_max_length),
        };

        config.validate()?;
        Ok(config)
    }

    /// Set both usage limits.
    pub fn with_limits(mut self, daily: u32, monthly: u32) -> Self {
        self.daily_limit = daily;
        self.monthly_limit = monthly;
        self
    }

    /// Set the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the entitlement duration.
    pub fn with_entitlement_duration(mut self, duration: Duration) -> Self {
        self.entitlement_duration = duration;
        self
    }

    /// Set the per-call store timeout.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Enable or disable entitlement stacking.
    pub fn with_stacking(mut self, enabled: bool) -> Self {
        self.entitlement_stacking = enabled;
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - both limits are at least 1 and monthly >= daily
    /// - every duration is non-zero
    /// - grants are remembered at least as long as they last
    /// - default_max_length >= MIN_MAX_LENGTH
    pub fn validate(&self) -> ThreadloomResult<()> {
        if self.daily_limit == 0 {
            return Err(invalid("daily_limit", self.daily_limit, "must be at least 1"));
        }
        if self.monthly_limit == 0 {
            return Err(invalid("monthly_limit", self.monthly_limit, "must be at least 1"));
        }
        if self.monthly_limit < self.daily_limit {
            return Err(ThreadloomError::Config(ConfigError::IncompatibleOptions {
                option_a: format!("daily_limit={}", self.daily_limit),
                option_b: format!("monthly_limit={}", self.monthly_limit),
            }));
        }

        for (field, value) in [
            ("cache_ttl", self.cache_ttl),
            ("entitlement_duration", self.entitlement_duration),
            ("store_timeout", self.store_timeout),
            ("grant_record_ttl", self.grant_record_ttl),
        ] {
            if value.is_zero() {
                return Err(invalid(field, format!("{:?}", value), "must be greater than zero"));
            }
        }

        if self.grant_record_ttl < self.entitlement_duration {
            return Err(ThreadloomError::Config(ConfigError::IncompatibleOptions {
                option_a: format!("grant_record_ttl={:?}", self.grant_record_ttl),
                option_b: format!("entitlement_duration={:?}", self.entitlement_duration),
            }));
        }

        if self.default_max_length < MIN_MAX_LENGTH {
            return Err(invalid(
                "default_max_length",
                self.default_max_length,
                &format!("must be at least {}", MIN_MAX_LENGTH),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ThreadloomError {
    ThreadloomError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GovernanceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.daily_limit, 5);
        assert_eq!(config.monthly_limit, 50);
        assert_eq!(config.entitlement_duration, Duration::from_secs(30 * 86400));
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.default_max_length, 280);
        assert!(!config.entitlement_stacking);
    }

    #[test]
    fn test_builder_setters() {
        let config = GovernanceConfig::new()
            .with_limits(3, 10)
            .with_cache_ttl(Duration::from_secs(60))
            .with_entitlement_duration(Duration::from_secs(3600))
            .with_store_timeout(Duration::from_millis(50))
            .with_stacking(true);

        assert_eq!(config.daily_limit, 3);
        assert_eq!(config.monthly_limit, 10);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.entitlement_duration, Duration::from_secs(3600));
        assert_eq!(config.store_timeout, Duration::from_millis(50));
        assert!(config.entitlement_stacking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_daily_limit_rejected() {
        let config = GovernanceConfig::new().with_limits(0, 10);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("daily_limit"));
    }

    #[test]
    fn test_monthly_below_daily_rejected() {
        let config = GovernanceConfig::new().with_limits(10, 5);
        assert!(matches!(
            config.validate(),
            Err(ThreadloomError::Config(ConfigError::IncompatibleOptions { .. }))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = GovernanceConfig::new().with_store_timeout(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store_timeout"));
    }

    #[test]
    fn test_grant_record_shorter_than_entitlement_rejected() {
        let mut config = GovernanceConfig::new();
        config.grant_record_ttl = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_small_max_length_rejected() {
        let mut config = GovernanceConfig::new();
        config.default_max_length = 8;
        assert!(config.validate().is_err());
    }
}
