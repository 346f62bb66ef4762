// ABOUTME: System-wide constants and environment-based configuration defaults
// ABOUTME: Provider name strings, sync cadence defaults, and backoff parameters
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! Application constants and environment-variable names.
//!
//! Hardcoded values here are defaults only; every tunable can be overridden
//! through the `WEARSYNC_*` environment surface (see [`crate::config`]).

/// Canonical provider name strings used in logs, errors, and configuration keys
pub mod provider_names {
    /// Apple Watch (reached through the companion-app bridge service)
    pub const APPLE_WATCH: &str = "apple_watch";
    /// WHOOP
    pub const WHOOP: &str = "whoop";
    /// Garmin
    pub const GARMIN: &str = "garmin";
    /// Fitbit
    pub const FITBIT: &str = "fitbit";
    /// Samsung Health (reached through the companion-app bridge service)
    pub const SAMSUNG: &str = "samsung";
    /// Oura
    pub const OURA: &str = "oura";
    /// Polar
    pub const POLAR: &str = "polar";
}

/// Synchronization defaults
pub mod sync_defaults {
    /// Default sync cadence for new connections (minutes)
    pub const SYNC_FREQUENCY_MINUTES: u32 = 30;
    /// Total per-sync fan-out budget; unfinished families become transient errors (seconds)
    pub const SYNC_TIMEOUT_SECS: u64 = 30;
    /// Courtesy spacing between successive device syncs in a batch (milliseconds)
    pub const COURTESY_SPACING_MS: u64 = 1_000;
    /// Upper bound on concurrent outbound sync/probe work
    pub const WORKER_POOL_SIZE: usize = 12;
    /// How far back the first sync of a never-synced connection reaches (days)
    pub const INITIAL_BACKFILL_DAYS: i64 = 7;
}

/// Token refresh defaults
pub mod token_defaults {
    /// Safety margin before nominal expiry at which a token is treated as expired (seconds)
    pub const EXPIRY_SKEW_SECS: i64 = 60;
}

/// Connection health and reconnection defaults
pub mod health_defaults {
    /// Consecutive failures at which a connection flips unhealthy
    pub const FAILURE_THRESHOLD: u32 = 3;
    /// Base reconnection delay (seconds)
    pub const BACKOFF_BASE_SECS: u64 = 30;
    /// Exponential backoff multiplier
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    /// Reconnection delay ceiling (seconds)
    pub const BACKOFF_MAX_SECS: u64 = 300;
    /// Automatic reconnection attempts allowed per trailing window
    pub const MAX_ATTEMPTS_PER_WINDOW: u32 = 5;
    /// Trailing window over which reconnection attempts are counted (seconds)
    pub const ATTEMPT_WINDOW_SECS: u64 = 3_600;
    /// Liveness probe interval (seconds)
    pub const PROBE_INTERVAL_SECS: u64 = 300;
}

/// HTTP client defaults
pub mod http_defaults {
    /// Per-request timeout (seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    /// Connection establishment timeout (seconds)
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
    /// Longest a sync will wait for a rate-limit token before giving up (milliseconds)
    pub const RATE_LIMIT_MAX_WAIT_MS: u64 = 2_000;
}

/// Shutdown defaults
pub mod shutdown_defaults {
    /// Grace period for draining in-flight syncs before force-cancel (seconds)
    pub const GRACE_PERIOD_SECS: u64 = 10;
}
