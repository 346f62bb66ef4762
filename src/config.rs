// ABOUTME: Environment-only configuration for the sync engine and per-provider credentials
// ABOUTME: WEARSYNC_* variables with hardcoded defaults; no config files, no hard-coded secrets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! Environment-based configuration.
//!
//! Global tunables come from `WEARSYNC_*` variables; per-provider credentials
//! and endpoint overrides from `WEARSYNC_<PROVIDER>_*` (e.g.
//! `WEARSYNC_FITBIT_CLIENT_ID`). Every value has a default except client
//! credentials, which stay `None` until configured.

use crate::constants::{
    health_defaults, http_defaults, shutdown_defaults, sync_defaults, token_defaults,
};
use std::env;
use std::time::Duration;

/// Read an environment variable, parsing into `T` and falling back on default
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Reconnection backoff parameters for the health monitor
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Base delay before the first reconnection attempt
    pub base_delay: Duration,
    /// Exponential multiplier applied per attempt in the window
    pub multiplier: f64,
    /// Delay ceiling
    pub max_delay: Duration,
    /// Automatic attempts allowed per trailing window
    pub max_attempts_per_window: u32,
    /// Trailing window over which attempts are counted
    pub attempt_window: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(health_defaults::BACKOFF_BASE_SECS),
            multiplier: health_defaults::BACKOFF_MULTIPLIER,
            max_delay: Duration::from_secs(health_defaults::BACKOFF_MAX_SECS),
            max_attempts_per_window: health_defaults::MAX_ATTEMPTS_PER_WINDOW,
            attempt_window: Duration::from_secs(health_defaults::ATTEMPT_WINDOW_SECS),
        }
    }
}

impl BackoffConfig {
    /// Load backoff parameters from `WEARSYNC_BACKOFF_*` variables
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_delay: Duration::from_secs(env_parse(
                "WEARSYNC_BACKOFF_BASE_SECS",
                defaults.base_delay.as_secs(),
            )),
            multiplier: env_parse("WEARSYNC_BACKOFF_MULTIPLIER", defaults.multiplier),
            max_delay: Duration::from_secs(env_parse(
                "WEARSYNC_BACKOFF_MAX_SECS",
                defaults.max_delay.as_secs(),
            )),
            max_attempts_per_window: env_parse(
                "WEARSYNC_BACKOFF_MAX_ATTEMPTS",
                defaults.max_attempts_per_window,
            ),
            attempt_window: Duration::from_secs(env_parse(
                "WEARSYNC_BACKOFF_WINDOW_SECS",
                defaults.attempt_window.as_secs(),
            )),
        }
    }
}

/// Engine-wide configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Default sync cadence for connections registered without one (minutes)
    pub default_sync_frequency_minutes: u32,
    /// Total fan-out budget per sync
    pub sync_timeout: Duration,
    /// Courtesy spacing between devices in `sync_all`
    pub courtesy_spacing: Duration,
    /// Worker pool size bounding concurrent outbound work
    pub worker_pool_size: usize,
    /// How far back a never-synced connection backfills (days)
    pub initial_backfill_days: i64,
    /// Safety margin before token expiry at which a refresh happens (seconds)
    pub token_expiry_skew_secs: i64,
    /// Liveness probe interval
    pub probe_interval: Duration,
    /// Longest a sync waits for a provider rate-limit token
    pub rate_limit_max_wait: Duration,
    /// Grace period for draining in-flight syncs at shutdown
    pub shutdown_grace: Duration,
    /// Reconnection backoff parameters
    pub backoff: BackoffConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_sync_frequency_minutes: sync_defaults::SYNC_FREQUENCY_MINUTES,
            sync_timeout: Duration::from_secs(sync_defaults::SYNC_TIMEOUT_SECS),
            courtesy_spacing: Duration::from_millis(sync_defaults::COURTESY_SPACING_MS),
            worker_pool_size: sync_defaults::WORKER_POOL_SIZE,
            initial_backfill_days: sync_defaults::INITIAL_BACKFILL_DAYS,
            token_expiry_skew_secs: token_defaults::EXPIRY_SKEW_SECS,
            probe_interval: Duration::from_secs(health_defaults::PROBE_INTERVAL_SECS),
            rate_limit_max_wait: Duration::from_millis(http_defaults::RATE_LIMIT_MAX_WAIT_MS),
            shutdown_grace: Duration::from_secs(shutdown_defaults::GRACE_PERIOD_SECS),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load engine configuration from the `WEARSYNC_*` environment surface
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_sync_frequency_minutes: env_parse(
                "WEARSYNC_SYNC_FREQUENCY_MINUTES",
                defaults.default_sync_frequency_minutes,
            ),
            sync_timeout: Duration::from_secs(env_parse(
                "WEARSYNC_SYNC_TIMEOUT_SECS",
                defaults.sync_timeout.as_secs(),
            )),
            courtesy_spacing: Duration::from_millis(env_parse(
                "WEARSYNC_COURTESY_SPACING_MS",
                defaults.courtesy_spacing.as_millis() as u64,
            )),
            worker_pool_size: env_parse("WEARSYNC_WORKER_POOL_SIZE", defaults.worker_pool_size),
            initial_backfill_days: env_parse(
                "WEARSYNC_INITIAL_BACKFILL_DAYS",
                defaults.initial_backfill_days,
            ),
            token_expiry_skew_secs: env_parse(
                "WEARSYNC_TOKEN_EXPIRY_SKEW_SECS",
                defaults.token_expiry_skew_secs,
            ),
            probe_interval: Duration::from_secs(env_parse(
                "WEARSYNC_PROBE_INTERVAL_SECS",
                defaults.probe_interval.as_secs(),
            )),
            rate_limit_max_wait: Duration::from_millis(env_parse(
                "WEARSYNC_RATE_LIMIT_MAX_WAIT_MS",
                defaults.rate_limit_max_wait.as_millis() as u64,
            )),
            shutdown_grace: Duration::from_secs(env_parse(
                "WEARSYNC_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace.as_secs(),
            )),
            backoff: BackoffConfig::from_env(),
        }
    }
}

/// Per-provider settings loaded from the environment
#[derive(Debug, Clone)]
pub struct ProviderEnvConfig {
    /// OAuth client id registered with the provider
    pub client_id: Option<String>,
    /// OAuth client secret registered with the provider
    pub client_secret: Option<String>,
    /// Token endpoint URL
    pub token_url: String,
    /// Base URL for data API calls
    pub api_base_url: String,
    /// Optional token revocation endpoint
    pub revoke_url: Option<String>,
}

/// Load one provider's environment configuration.
///
/// Variable format:
///
/// ```text
/// export WEARSYNC_FITBIT_CLIENT_ID=your_client_id
/// export WEARSYNC_FITBIT_CLIENT_SECRET=your_secret
/// export WEARSYNC_FITBIT_API_BASE_URL=https://api.fitbit.com/1
/// ```
#[must_use]
pub fn load_provider_env_config(
    provider: &str,
    default_token_url: &str,
    default_api_base_url: &str,
    default_revoke_url: Option<&str>,
) -> ProviderEnvConfig {
    let upper = provider.to_uppercase();

    ProviderEnvConfig {
        client_id: env::var(format!("WEARSYNC_{upper}_CLIENT_ID")).ok(),
        client_secret: env::var(format!("WEARSYNC_{upper}_CLIENT_SECRET")).ok(),
        token_url: env::var(format!("WEARSYNC_{upper}_TOKEN_URL"))
            .unwrap_or_else(|_| default_token_url.to_owned()),
        api_base_url: env::var(format!("WEARSYNC_{upper}_API_BASE_URL"))
            .unwrap_or_else(|_| default_api_base_url.to_owned()),
        revoke_url: env::var(format!("WEARSYNC_{upper}_REVOKE_URL"))
            .ok()
            .or_else(|| default_revoke_url.map(ToOwned::to_owned)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_overrides_apply() {
        env::set_var("WEARSYNC_SYNC_TIMEOUT_SECS", "45");
        env::set_var("WEARSYNC_WORKER_POOL_SIZE", "4");
        let config = ServiceConfig::from_env();
        assert_eq!(config.sync_timeout, Duration::from_secs(45));
        assert_eq!(config.worker_pool_size, 4);
        env::remove_var("WEARSYNC_SYNC_TIMEOUT_SECS");
        env::remove_var("WEARSYNC_WORKER_POOL_SIZE");
    }

    #[test]
    #[serial]
    fn malformed_values_fall_back_to_defaults() {
        env::set_var("WEARSYNC_SYNC_TIMEOUT_SECS", "not-a-number");
        let config = ServiceConfig::from_env();
        assert_eq!(
            config.sync_timeout,
            Duration::from_secs(sync_defaults::SYNC_TIMEOUT_SECS)
        );
        env::remove_var("WEARSYNC_SYNC_TIMEOUT_SECS");
    }

    #[test]
    #[serial]
    fn provider_env_config_prefers_env_urls() {
        env::set_var("WEARSYNC_OURA_API_BASE_URL", "https://stub.local/v2");
        let config = load_provider_env_config(
            "oura",
            "https://api.ouraring.com/oauth/token",
            "https://api.ouraring.com/v2",
            None,
        );
        assert_eq!(config.api_base_url, "https://stub.local/v2");
        assert!(config.client_id.is_none());
        env::remove_var("WEARSYNC_OURA_API_BASE_URL");
    }
}
