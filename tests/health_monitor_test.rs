// ABOUTME: Tests for health transitions, failure counting, and reconnection backoff bounds
// ABOUTME: Covers the threshold flip, rate-limit exemption, window cap, and backoff monotonicity
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors
#![allow(missing_docs, clippy::unwrap_used)]

use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;
use wearsync::config::BackoffConfig;
use wearsync::errors::ProviderError;
use wearsync::models::SyncResult;
use wearsync::{HealthMonitor, HealthVerdict};

fn result(device_id: &str, success: bool, rate_limited: bool) -> SyncResult {
    SyncResult {
        device_id: device_id.to_owned(),
        success,
        data_point_count: usize::from(success) * 4,
        families: BTreeMap::new(),
        errors: if success {
            Vec::new()
        } else {
            vec!["heart_rate: transient fitbit failure: 502".to_owned()]
        },
        last_sync: Utc::now(),
        next_sync: Utc::now() + chrono::Duration::minutes(30),
        duration_ms: 120,
        rate_limited,
    }
}

fn monitor() -> HealthMonitor {
    HealthMonitor::new(BackoffConfig {
        base_delay: Duration::from_secs(30),
        multiplier: 2.0,
        max_delay: Duration::from_secs(300),
        max_attempts_per_window: 5,
        attempt_window: Duration::from_secs(3_600),
    })
}

#[test]
fn third_consecutive_failure_flips_unhealthy_exactly_once() {
    let monitor = monitor();
    monitor.track("dev-1");

    assert_eq!(
        monitor.observe(&result("dev-1", false, false)),
        HealthVerdict::Degraded {
            consecutive_failures: 1
        }
    );
    assert!(monitor.get("dev-1").unwrap().is_healthy);

    assert_eq!(
        monitor.observe(&result("dev-1", false, false)),
        HealthVerdict::Degraded {
            consecutive_failures: 2
        }
    );
    assert!(monitor.get("dev-1").unwrap().is_healthy);

    // Exactly at three the flip happens and a reconnect is requested
    let verdict = monitor.observe(&result("dev-1", false, false));
    assert!(matches!(verdict, HealthVerdict::ScheduleReconnect { .. }));
    let health = monitor.get("dev-1").unwrap();
    assert!(!health.is_healthy);
    assert_eq!(health.consecutive_failures, 3);
}

#[test]
fn single_success_restores_health_and_resets_the_counter() {
    let monitor = monitor();
    monitor.track("dev-1");
    for _ in 0..4 {
        monitor.observe(&result("dev-1", false, false));
    }
    assert!(!monitor.get("dev-1").unwrap().is_healthy);

    assert_eq!(
        monitor.observe(&result("dev-1", true, false)),
        HealthVerdict::Healthy
    );
    let health = monitor.get("dev-1").unwrap();
    assert!(health.is_healthy);
    assert_eq!(health.consecutive_failures, 0);
    assert!(health.last_successful_sync.is_some());
    assert!(health.last_error.is_none());
}

#[test]
fn rate_limited_cycles_do_not_count_as_failures() {
    let monitor = monitor();
    monitor.track("dev-1");

    for _ in 0..10 {
        monitor.observe(&result("dev-1", false, true));
    }
    let health = monitor.get("dev-1").unwrap();
    assert!(health.is_healthy);
    assert_eq!(health.consecutive_failures, 0);
}

#[test]
fn backoff_is_monotonic_within_the_window_and_capped() {
    let monitor = monitor();
    let mut last = Duration::ZERO;
    for attempts in 0..10 {
        let delay = monitor.reconnect_delay(attempts);
        assert!(delay >= last, "delay regressed at attempt {attempts}");
        assert!(delay <= Duration::from_secs(300));
        last = delay;
    }
    assert_eq!(monitor.reconnect_delay(0), Duration::from_secs(30));
    assert_eq!(monitor.reconnect_delay(1), Duration::from_secs(60));
    assert_eq!(monitor.reconnect_delay(9), Duration::from_secs(300));
}

#[test]
fn attempt_cap_suppresses_automatic_reconnection() {
    let monitor = monitor();
    monitor.track("dev-1");

    // Five attempts already burned inside the window
    for _ in 0..5 {
        monitor.record_reconnect_attempt("dev-1");
    }
    for _ in 0..3 {
        monitor.observe(&result("dev-1", false, false));
    }

    let verdict = monitor.observe(&result("dev-1", false, false));
    assert_eq!(verdict, HealthVerdict::ManualReconnectRequired);
    let health = monitor.get("dev-1").unwrap();
    assert!(health.requires_manual_reconnect);
    assert!(monitor.unhealthy().iter().any(|h| h.device_id == "dev-1"));
}

#[test]
fn success_clears_the_attempt_window() {
    let monitor = monitor();
    monitor.track("dev-1");
    for _ in 0..4 {
        monitor.record_reconnect_attempt("dev-1");
    }
    assert_eq!(monitor.attempts_in_window("dev-1"), 4);

    monitor.observe(&result("dev-1", true, false));
    assert_eq!(monitor.attempts_in_window("dev-1"), 0);
}

#[test]
fn failed_probes_count_exactly_like_failed_syncs() {
    let monitor = monitor();
    monitor.track("dev-1");

    let err = ProviderError::Transient {
        provider: "garmin".to_owned(),
        message: "probe timeout".to_owned(),
    };
    monitor.observe_probe("dev-1", Some(&err));
    monitor.observe_probe("dev-1", Some(&err));
    let verdict = monitor.observe_probe("dev-1", Some(&err));

    assert!(matches!(verdict, HealthVerdict::ScheduleReconnect { .. }));
    assert!(!monitor.get("dev-1").unwrap().is_healthy);
}

#[test]
fn rate_limited_probes_are_exempt_from_health_accounting() {
    let monitor = monitor();
    monitor.track("dev-1");

    let err = ProviderError::RateLimited {
        provider: "fitbit".to_owned(),
        retry_after_secs: 60,
    };
    for _ in 0..5 {
        assert_eq!(
            monitor.observe_probe("dev-1", Some(&err)),
            HealthVerdict::Healthy
        );
    }
    assert_eq!(monitor.get("dev-1").unwrap().consecutive_failures, 0);
}

#[test]
fn forgetting_a_device_drops_all_health_state() {
    let monitor = monitor();
    monitor.track("dev-1");
    monitor.observe(&result("dev-1", false, false));
    monitor.record_reconnect_attempt("dev-1");

    monitor.forget("dev-1");
    assert!(monitor.get("dev-1").is_none());
    assert_eq!(monitor.attempts_in_window("dev-1"), 0);
}

#[test]
fn response_time_rolls_into_the_average() {
    let monitor = monitor();
    monitor.track("dev-1");

    monitor.observe(&result("dev-1", true, false));
    let first = monitor.get("dev-1").unwrap().average_response_time_ms;
    assert!((first - 120.0).abs() < f64::EPSILON);

    monitor.observe(&result("dev-1", true, false));
    let second = monitor.get("dev-1").unwrap().average_response_time_ms;
    assert!((second - 120.0).abs() < 1.0);
}
