// ABOUTME: Connection health monitoring decoupled from individual sync outcomes
// ABOUTME: Failure counting, backoff-bounded reconnection scheduling, and the attempt-window cap
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! Health monitor.
//!
//! Separates "is this connection structurally OK" from "did this one fetch
//! succeed". The monitor owns all [`ConnectionHealth`] state and the
//! reconnection attempt history; the orchestrator and registry never reach
//! into it, they only hand over [`SyncResult`] values.

use crate::config::BackoffConfig;
use crate::constants::health_defaults;
use crate::errors::ProviderError;
use crate::models::{ConnectionHealth, SyncResult};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Smoothing factor for the rolling response-time mean
const RESPONSE_TIME_ALPHA: f64 = 0.2;

/// What the monitor wants done after observing a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// Connection is healthy; nothing to do
    Healthy,
    /// Failures recorded but still under the threshold
    Degraded {
        /// Current consecutive failure count
        consecutive_failures: u32,
    },
    /// Connection is unhealthy; attempt reconnection after the delay
    ScheduleReconnect {
        /// Backoff delay before the attempt
        delay: Duration,
    },
    /// Automatic reconnection budget exhausted; user action required
    ManualReconnectRequired,
}

/// Tracks per-connection health and bounds automatic reconnection.
///
/// Reconnection delays follow `min(base * multiplier^attempts, max)` where
/// `attempts` counts attempts in the trailing window (not lifetime), so retry
/// storms stay bounded while a quiet hour earns a clean slate.
pub struct HealthMonitor {
    threshold: u32,
    backoff: BackoffConfig,
    health: Mutex<HashMap<String, ConnectionHealth>>,
    attempts: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl HealthMonitor {
    /// Monitor with the default failure threshold
    #[must_use]
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            threshold: health_defaults::FAILURE_THRESHOLD,
            backoff,
            health: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn health_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, ConnectionHealth>> {
        match self.health.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn attempts_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<DateTime<Utc>>>> {
        match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start tracking a newly registered connection
    pub fn track(&self, device_id: &str) {
        self.health_map()
            .entry(device_id.to_owned())
            .or_insert_with(|| ConnectionHealth::new(device_id));
    }

    /// Drop all state for a removed connection. Health records are never
    /// deleted independently; they disappear with the connection.
    pub fn forget(&self, device_id: &str) {
        self.health_map().remove(device_id);
        self.attempts_map().remove(device_id);
    }

    /// Snapshot of one connection's health
    #[must_use]
    pub fn get(&self, device_id: &str) -> Option<ConnectionHealth> {
        self.health_map().get(device_id).cloned()
    }

    /// Snapshot of every unhealthy connection
    #[must_use]
    pub fn unhealthy(&self) -> Vec<ConnectionHealth> {
        self.health_map()
            .values()
            .filter(|h| !h.is_healthy)
            .cloned()
            .collect()
    }

    /// Feed one sync result into health accounting
    pub fn observe(&self, result: &SyncResult) -> HealthVerdict {
        if result.success {
            return self.record_success(&result.device_id, result.last_sync, result.duration_ms);
        }

        // Rate limiting is congestion, not breakage: leave the counters alone
        // and let the orchestrator's scheduling back off instead.
        if result.rate_limited {
            let healthy = self
                .health_map()
                .get(&result.device_id)
                .is_none_or(|h| h.is_healthy);
            return if healthy {
                HealthVerdict::Healthy
            } else {
                HealthVerdict::Degraded {
                    consecutive_failures: self
                        .get(&result.device_id)
                        .map_or(0, |h| h.consecutive_failures),
                }
            };
        }

        self.record_failure(
            &result.device_id,
            result.errors.first().cloned(),
            result.duration_ms,
        )
    }

    /// Feed one probe outcome into health accounting.
    ///
    /// A failed probe counts toward `consecutive_failures` exactly like a
    /// failed sync; a clean probe is a liveness signal only and leaves the
    /// counters alone.
    pub fn observe_probe(&self, device_id: &str, error: Option<&ProviderError>) -> HealthVerdict {
        match error {
            None => HealthVerdict::Healthy,
            Some(e) if !e.counts_against_health() => HealthVerdict::Healthy,
            Some(e) => self.record_failure(device_id, Some(e.to_string()), 0),
        }
    }

    /// Record the start of a reconnection attempt in the trailing window.
    /// Forced reconnects bypass the cap and are not recorded.
    pub fn record_reconnect_attempt(&self, device_id: &str) {
        self.attempts_map()
            .entry(device_id.to_owned())
            .or_default()
            .push_back(Utc::now());
    }

    /// Attempts recorded within the trailing window, pruning expired entries
    #[must_use]
    pub fn attempts_in_window(&self, device_id: &str) -> u32 {
        let cutoff = Utc::now()
            - chrono::Duration::seconds(self.backoff.attempt_window.as_secs() as i64);
        let mut attempts = self.attempts_map();
        let Some(history) = attempts.get_mut(device_id) else {
            return 0;
        };
        while history.front().is_some_and(|t| *t < cutoff) {
            history.pop_front();
        }
        history.len() as u32
    }

    /// Backoff delay for the next reconnection attempt
    #[must_use]
    pub fn reconnect_delay(&self, attempts_in_window: u32) -> Duration {
        let factor = self.backoff.multiplier.powi(attempts_in_window as i32);
        let delay = self.backoff.base_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.backoff.max_delay.as_secs_f64()))
    }

    fn record_success(
        &self,
        device_id: &str,
        at: DateTime<Utc>,
        duration_ms: u64,
    ) -> HealthVerdict {
        {
            let mut health = self.health_map();
            let entry = health
                .entry(device_id.to_owned())
                .or_insert_with(|| ConnectionHealth::new(device_id));
            if !entry.is_healthy {
                info!(device_id, "connection recovered");
            }
            entry.is_healthy = true;
            entry.consecutive_failures = 0;
            entry.last_successful_sync = Some(at);
            entry.last_error = None;
            entry.requires_manual_reconnect = false;
            Self::fold_response_time(entry, duration_ms);
        }
        // A success earns a clean backoff slate
        self.attempts_map().remove(device_id);
        HealthVerdict::Healthy
    }

    fn record_failure(
        &self,
        device_id: &str,
        error: Option<String>,
        duration_ms: u64,
    ) -> HealthVerdict {
        let (failures, already_manual) = {
            let mut health = self.health_map();
            let entry = health
                .entry(device_id.to_owned())
                .or_insert_with(|| ConnectionHealth::new(device_id));
            entry.consecutive_failures += 1;
            entry.last_error = error;
            Self::fold_response_time(entry, duration_ms);

            if entry.consecutive_failures >= self.threshold && entry.is_healthy {
                entry.is_healthy = false;
                warn!(
                    device_id,
                    consecutive_failures = entry.consecutive_failures,
                    "connection flipped unhealthy"
                );
            }
            (entry.consecutive_failures, entry.requires_manual_reconnect)
        };

        if failures < self.threshold {
            return HealthVerdict::Degraded {
                consecutive_failures: failures,
            };
        }
        if already_manual {
            return HealthVerdict::ManualReconnectRequired;
        }

        let attempts = self.attempts_in_window(device_id);
        if attempts >= self.backoff.max_attempts_per_window {
            warn!(
                device_id,
                attempts, "reconnection budget exhausted; manual reconnect required"
            );
            if let Some(entry) = self.health_map().get_mut(device_id) {
                entry.requires_manual_reconnect = true;
            }
            return HealthVerdict::ManualReconnectRequired;
        }

        HealthVerdict::ScheduleReconnect {
            delay: self.reconnect_delay(attempts),
        }
    }

    fn fold_response_time(entry: &mut ConnectionHealth, duration_ms: u64) {
        if duration_ms == 0 {
            return;
        }
        let sample = duration_ms as f64;
        if entry.average_response_time_ms == 0.0 {
            entry.average_response_time_ms = sample;
        } else {
            entry.average_response_time_ms = entry.average_response_time_ms
                * (1.0 - RESPONSE_TIME_ALPHA)
                + sample * RESPONSE_TIME_ALPHA;
        }
    }
}
