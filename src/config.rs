//! Environment-sourced configuration (spec §6 "Configuration source").
//!
//! Every key is read from an env var named `"{prefix}_{FIELD_UPPER_SNAKE}"`,
//! e.g. with prefix `"CREW"`, `max_concurrency` comes from
//! `CREW_MAX_CONCURRENCY`. Unset vars fall back to the defaults below;
//! malformed values are a `CoreError::Configuration`.

use crate::error::{CoreError, CoreResult};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub debug: bool,
    pub log_level: String,
    pub max_concurrency: usize,
    pub default_timeout_ms: u64,
    pub rate_max_rpm: u32,
    pub memory_short_term_capacity: usize,
    pub memory_archive_age_ms: u64,
    pub vector_cache_ttl_ms: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
            max_concurrency: 4,
            default_timeout_ms: 60_000,
            rate_max_rpm: 60,
            memory_short_term_capacity: 100,
            memory_archive_age_ms: 7 * 24 * 60 * 60 * 1000,
            vector_cache_ttl_ms: 5 * 60 * 1000,
        }
    }
}

impl EnvConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn memory_archive_age(&self) -> Duration {
        Duration::from_millis(self.memory_archive_age_ms)
    }

    pub fn vector_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.vector_cache_ttl_ms)
    }

    /// Build configuration from `"{prefix}_*"` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_prefixed_env(prefix: &str) -> CoreResult<Self> {
        let defaults = Self::default();
        let cfg = Self {
            debug: read_bool(prefix, "DEBUG", defaults.debug)?,
            log_level: read_string(prefix, "LOG_LEVEL", &defaults.log_level),
            max_concurrency: read_usize(prefix, "MAX_CONCURRENCY", defaults.max_concurrency)?,
            default_timeout_ms: read_u64(prefix, "DEFAULT_TIMEOUT_MS", defaults.default_timeout_ms)?,
            rate_max_rpm: read_u32(prefix, "RATE_MAX_RPM", defaults.rate_max_rpm)?,
            memory_short_term_capacity: read_usize(
                prefix,
                "MEMORY_SHORT_TERM_CAPACITY",
                defaults.memory_short_term_capacity,
            )?,
            memory_archive_age_ms: read_u64(prefix, "MEMORY_ARCHIVE_AGE_MS", defaults.memory_archive_age_ms)?,
            vector_cache_ttl_ms: read_u64(prefix, "VECTOR_CACHE_TTL_MS", defaults.vector_cache_ttl_ms)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.max_concurrency < 1 {
            return Err(CoreError::configuration("max_concurrency must be >= 1"));
        }
        if self.rate_max_rpm < 1 {
            return Err(CoreError::configuration("rate_max_rpm must be >= 1"));
        }
        Ok(())
    }
}

fn var_name(prefix: &str, field: &str) -> String {
    format!("{prefix}_{field}")
}

fn read_string(prefix: &str, field: &str, default: &str) -> String {
    env::var(var_name(prefix, field)).unwrap_or_else(|_| default.to_string())
}

fn read_bool(prefix: &str, field: &str, default: bool) -> CoreResult<bool> {
    match env::var(var_name(prefix, field)) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<bool>()
            .map_err(|_| CoreError::configuration(format!("{} must be a bool", var_name(prefix, field)))),
    }
}

fn read_usize(prefix: &str, field: &str, default: usize) -> CoreResult<usize> {
    match env::var(var_name(prefix, field)) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|_| CoreError::configuration(format!("{} must be a non-negative integer", var_name(prefix, field)))),
    }
}

fn read_u32(prefix: &str, field: &str, default: u32) -> CoreResult<u32> {
    match env::var(var_name(prefix, field)) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<u32>()
            .map_err(|_| CoreError::configuration(format!("{} must be a non-negative integer", var_name(prefix, field)))),
    }
}

fn read_u64(prefix: &str, field: &str, default: u64) -> CoreResult<u64> {
    match env::var(var_name(prefix, field)) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| CoreError::configuration(format!("{} must be a non-negative integer", var_name(prefix, field)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("CREWTEST_MAX_CONCURRENCY");
        let cfg = EnvConfig::from_prefixed_env("CREWTEST").unwrap();
        assert_eq!(cfg.max_concurrency, 4);
        assert_eq!(cfg.default_timeout_ms, 60_000);
    }

    #[test]
    fn overrides_are_read_from_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("CREWTEST2_MAX_CONCURRENCY", "8");
        let cfg = EnvConfig::from_prefixed_env("CREWTEST2").unwrap();
        assert_eq!(cfg.max_concurrency, 8);
        env::remove_var("CREWTEST2_MAX_CONCURRENCY");
    }

    #[test]
    fn rejects_zero_concurrency() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("CREWTEST3_MAX_CONCURRENCY", "0");
        let err = EnvConfig::from_prefixed_env("CREWTEST3").unwrap_err();
        assert_eq!(err.code(), "configuration");
        env::remove_var("CREWTEST3_MAX_CONCURRENCY");
    }
}
