// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Queue naming and polling used by the swapper interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapperConfig {
    /// Shared results queue
    pub results_queue: String,
    /// Prefix of per-model input queue names
    pub model_input_queue_prefix: String,
    /// Shared scheduler notification queue
    pub scheduler_notification_queue: String,
    /// Sleep between polls of a blocking consumer
    pub poll_interval: Duration,
}

impl Default for SwapperConfig {
    fn default() -> Self {
        Self {
            results_queue: "swapper.results".to_string(),
            model_input_queue_prefix: "swapper.model.input.".to_string(),
            scheduler_notification_queue: "swapper.scheduler.notification".to_string(),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Checkpoint cadence of the model runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Requests processed per run before checkpointing
    pub target_requests_per_checkpoint: usize,
    /// Incremental samples kept before forcing a full checkpoint
    pub max_incremental_samples: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            target_requests_per_checkpoint: 500,
            max_incremental_samples: 100,
        }
    }
}

/// Model swapper configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL
    pub database_url: String,
    pub swapper: SwapperConfig,
    pub runner: RunnerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `SWAPPER_DATABASE_URL`: SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `SWAPPER_RESULTS_QUEUE` (default: swapper.results)
    /// - `SWAPPER_MODEL_INPUT_QUEUE_PREFIX` (default: swapper.model.input.)
    /// - `SWAPPER_SCHEDULER_NOTIFICATION_QUEUE` (default: swapper.scheduler.notification)
    /// - `SWAPPER_CONSUMER_POLL_INTERVAL_MS` (default: 250)
    /// - `SWAPPER_TARGET_REQUESTS_PER_CHECKPOINT` (default: 500)
    /// - `SWAPPER_MAX_INCREMENTAL_SAMPLES` (default: 100)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("SWAPPER_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("SWAPPER_DATABASE_URL"))?;

        let defaults = SwapperConfig::default();
        let swapper = SwapperConfig {
            results_queue: env_or("SWAPPER_RESULTS_QUEUE", defaults.results_queue),
            model_input_queue_prefix: env_or(
                "SWAPPER_MODEL_INPUT_QUEUE_PREFIX",
                defaults.model_input_queue_prefix,
            ),
            scheduler_notification_queue: env_or(
                "SWAPPER_SCHEDULER_NOTIFICATION_QUEUE",
                defaults.scheduler_notification_queue,
            ),
            poll_interval: Duration::from_millis(parse_env(
                "SWAPPER_CONSUMER_POLL_INTERVAL_MS",
                250u64,
                "must be a non-negative integer",
            )?),
        };

        let target_requests_per_checkpoint: usize = parse_env(
            "SWAPPER_TARGET_REQUESTS_PER_CHECKPOINT",
            500,
            "must be a positive integer",
        )?;
        if target_requests_per_checkpoint == 0 {
            return Err(ConfigError::Invalid(
                "SWAPPER_TARGET_REQUESTS_PER_CHECKPOINT",
                "must be a positive integer",
            ));
        }

        let max_incremental_samples = parse_env(
            "SWAPPER_MAX_INCREMENTAL_SAMPLES",
            100,
            "must be a non-negative integer",
        )?;

        Ok(Self {
            database_url,
            swapper,
            runner: RunnerConfig {
                target_requests_per_checkpoint,
                max_incremental_samples,
            },
        })
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn parse_env<T: FromStr>(
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key, expected)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const OPTIONAL_VARS: [&str; 6] = [
        "SWAPPER_RESULTS_QUEUE",
        "SWAPPER_MODEL_INPUT_QUEUE_PREFIX",
        "SWAPPER_SCHEDULER_NOTIFICATION_QUEUE",
        "SWAPPER_CONSUMER_POLL_INTERVAL_MS",
        "SWAPPER_TARGET_REQUESTS_PER_CHECKPOINT",
        "SWAPPER_MAX_INCREMENTAL_SAMPLES",
    ];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }

        fn clear_optional(&mut self) {
            for key in OPTIONAL_VARS {
                self.remove(key);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("SWAPPER_DATABASE_URL", "sqlite::memory:");
        guard.clear_optional();

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.swapper, SwapperConfig::default());
        assert_eq!(config.runner, RunnerConfig::default());
        assert_eq!(config.runner.target_requests_per_checkpoint, 500);
        assert_eq!(config.swapper.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("SWAPPER_DATABASE_URL", "sqlite:/var/lib/swapper.db");
        guard.set("SWAPPER_RESULTS_QUEUE", "results");
        guard.set("SWAPPER_MODEL_INPUT_QUEUE_PREFIX", "in.");
        guard.set("SWAPPER_SCHEDULER_NOTIFICATION_QUEUE", "sched");
        guard.set("SWAPPER_CONSUMER_POLL_INTERVAL_MS", "10");
        guard.set("SWAPPER_TARGET_REQUESTS_PER_CHECKPOINT", "10");
        guard.set("SWAPPER_MAX_INCREMENTAL_SAMPLES", "0");

        let config = Config::from_env().unwrap();

        assert_eq!(config.swapper.results_queue, "results");
        assert_eq!(config.swapper.model_input_queue_prefix, "in.");
        assert_eq!(config.swapper.scheduler_notification_queue, "sched");
        assert_eq!(config.swapper.poll_interval, Duration::from_millis(10));
        assert_eq!(config.runner.target_requests_per_checkpoint, 10);
        assert_eq!(config.runner.max_incremental_samples, 0);
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("SWAPPER_DATABASE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SWAPPER_DATABASE_URL")));
        assert!(err.to_string().contains("SWAPPER_DATABASE_URL"));
    }

    #[test]
    fn test_config_invalid_numbers() {
        let _lock = ENV_MUTEX.lock().unwrap();

        for (key, value) in [
            ("SWAPPER_CONSUMER_POLL_INTERVAL_MS", "soon"),
            ("SWAPPER_TARGET_REQUESTS_PER_CHECKPOINT", "-5"),
            ("SWAPPER_TARGET_REQUESTS_PER_CHECKPOINT", "0"),
            ("SWAPPER_MAX_INCREMENTAL_SAMPLES", "many"),
        ] {
            let mut guard = EnvGuard::new();
            guard.set("SWAPPER_DATABASE_URL", "sqlite::memory:");
            guard.clear_optional();
            guard.set(key, value);

            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid(k, _) if k == key),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
