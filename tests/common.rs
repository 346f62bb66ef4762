// ABOUTME: Shared test fixtures: scripted mock provider, failing store, and config helpers
// ABOUTME: The mock registers through the provider registry, the production test seam
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors
#![allow(missing_docs, dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;
use wearsync::config::{BackoffConfig, ServiceConfig};
use wearsync::errors::{ProviderError, ProviderResult};
use wearsync::models::{
    ActivitySummary, CanonicalSample, DataFamily, DeviceConnection, DeviceType, HeartRateSample,
    HrvSample, RecoveryScore, SleepSession,
};
use wearsync::providers::core::{
    AuthScheme, FetchWindow, ProviderConfig, RateLimitBudget, RefreshedTokens, WearableProvider,
};
use wearsync::service::RegisterDeviceInput;
use wearsync::storage::{SampleStore, StoreError};

/// Samples the mock returns per successful family fetch
pub const SAMPLES_PER_FAMILY: u64 = 2;

/// Scripted provider adapter: every failure mode is a switch the test flips
pub struct MockProvider {
    device_type: DeviceType,
    config: ProviderConfig,
    pub fetch_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub probe_calls: AtomicU32,
    pub revoke_calls: AtomicU32,
    inflight: AtomicU32,
    pub max_inflight: AtomicU32,
    pub fail_all_transient: AtomicBool,
    pub auth_fail_until_refresh: AtomicBool,
    pub refresh_fails: AtomicBool,
    pub probe_fails: AtomicBool,
    pub fail_families: Mutex<Vec<DataFamily>>,
    pub fetch_delay: Mutex<Duration>,
    pub last_window_since: Mutex<Option<DateTime<Utc>>>,
}

impl MockProvider {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            config: ProviderConfig {
                name: device_type.as_str().to_owned(),
                token_url: "http://mock.invalid/oauth/token".to_owned(),
                api_base_url: "http://mock.invalid/api".to_owned(),
                revoke_url: None,
                probe_path: "ping".to_owned(),
                client_id: Some("mock-client".to_owned()),
                client_secret: Some("mock-secret".to_owned()),
                auth: AuthScheme::Bearer,
                rate_limit: RateLimitBudget::per_minute(10_000),
            },
            fetch_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            probe_calls: AtomicU32::new(0),
            revoke_calls: AtomicU32::new(0),
            inflight: AtomicU32::new(0),
            max_inflight: AtomicU32::new(0),
            fail_all_transient: AtomicBool::new(false),
            auth_fail_until_refresh: AtomicBool::new(false),
            refresh_fails: AtomicBool::new(false),
            probe_fails: AtomicBool::new(false),
            fail_families: Mutex::new(Vec::new()),
            fetch_delay: Mutex::new(Duration::from_millis(10)),
            last_window_since: Mutex::new(None),
        }
    }

    fn sample_for(family: DataFamily, index: u64) -> CanonicalSample {
        let timestamp = Utc::now() - ChronoDuration::minutes(index as i64);
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        match family {
            DataFamily::HeartRate => CanonicalSample::HeartRate(HeartRateSample {
                timestamp,
                bpm: 60 + index as u32,
                zone: None,
            }),
            DataFamily::Hrv => CanonicalSample::Hrv(HrvSample {
                timestamp,
                hrv_ms: 55.0,
                rmssd: Some(55.0),
                sdnn: None,
            }),
            DataFamily::Sleep => CanonicalSample::Sleep(SleepSession {
                start: timestamp - ChronoDuration::hours(8),
                end: timestamp,
                duration_minutes: 450,
                stages: Vec::new(),
                quality: 80,
                efficiency: 91.0,
            }),
            DataFamily::Activity => CanonicalSample::Activity(ActivitySummary {
                date,
                steps: 10_000,
                distance_km: 7.2,
                calories: 2_300,
                active_minutes: 55,
            }),
            DataFamily::Recovery => CanonicalSample::Recovery(RecoveryScore {
                date,
                recovery_score: 70,
                hrv_score: None,
                resting_heart_rate: Some(50),
                sleep_performance: None,
                strain_yesterday: None,
                baseline_deviation: None,
                trend: None,
            }),
        }
    }
}

#[async_trait]
impl WearableProvider for MockProvider {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn fetch(
        &self,
        _connection: &DeviceConnection,
        family: DataFamily,
        window: &FetchWindow,
    ) -> ProviderResult<Value> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_window_since.lock().unwrap() = Some(window.since);

        let current = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(current, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.inflight.fetch_sub(1, Ordering::SeqCst);

        if self.auth_fail_until_refresh.load(Ordering::SeqCst)
            && self.refresh_calls.load(Ordering::SeqCst) == 0
        {
            return Err(ProviderError::TokenRejected {
                provider: self.config.name.clone(),
                reason: "token rejected by provider".to_owned(),
            });
        }
        if self.fail_all_transient.load(Ordering::SeqCst)
            || self.fail_families.lock().unwrap().contains(&family)
        {
            return Err(ProviderError::Transient {
                provider: self.config.name.clone(),
                message: "simulated upstream failure".to_owned(),
            });
        }

        Ok(json!({ "count": SAMPLES_PER_FAMILY }))
    }

    fn transform(&self, raw: &Value, family: DataFamily) -> ProviderResult<Vec<CanonicalSample>> {
        let count = raw.get("count").and_then(Value::as_u64).unwrap_or(0);
        Ok((0..count).map(|i| Self::sample_for(family, i)).collect())
    }

    async fn exchange_refresh_token(&self, _refresh_token: &str) -> ProviderResult<RefreshedTokens> {
        // Widen the race window so an unserialized second refresh would overlap
        tokio::time::sleep(Duration::from_millis(25)).await;
        if self.refresh_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::ReauthRequired {
                provider: self.config.name.clone(),
                reason: "invalid_grant".to_owned(),
            });
        }
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RefreshedTokens {
            access_token: format!("refreshed-token-{n}"),
            refresh_token: Some("rotated-refresh".to_owned()),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        })
    }

    async fn probe(&self, _connection: &DeviceConnection) -> ProviderResult<()> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Transient {
                provider: self.config.name.clone(),
                message: "probe failed".to_owned(),
            });
        }
        Ok(())
    }

    async fn revoke(&self, _connection: &DeviceConnection) -> ProviderResult<()> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Store whose writes always fail, for persistence-stage tests
pub struct FailingStore;

#[async_trait]
impl SampleStore for FailingStore {
    async fn persist(
        &self,
        _device_id: &str,
        _user_id: Uuid,
        _samples: &[CanonicalSample],
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_owned()))
    }
}

/// Engine config with short timings suitable for tests
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        courtesy_spacing: Duration::from_millis(5),
        sync_timeout: Duration::from_secs(5),
        backoff: BackoffConfig {
            base_delay: Duration::from_millis(5),
            multiplier: 2.0,
            max_delay: Duration::from_millis(20),
            max_attempts_per_window: 5,
            attempt_window: Duration::from_secs(3_600),
        },
        ..ServiceConfig::default()
    }
}

/// Registration input with the given expiry offset from now
pub fn register_input(
    device_id: &str,
    device_type: DeviceType,
    expiry_offset_secs: i64,
    with_refresh_token: bool,
) -> RegisterDeviceInput {
    RegisterDeviceInput {
        device_id: device_id.to_owned(),
        user_id: Uuid::new_v4(),
        device_type,
        access_token: "initial-token".to_owned(),
        refresh_token: with_refresh_token.then(|| "initial-refresh".to_owned()),
        token_expiry: Utc::now() + ChronoDuration::seconds(expiry_offset_secs),
        sync_frequency_minutes: Some(30),
    }
}

/// A bare device connection for registry-level tests
pub fn connection(device_id: &str, device_type: DeviceType) -> DeviceConnection {
    DeviceConnection {
        device_id: device_id.to_owned(),
        user_id: Uuid::new_v4(),
        device_type,
        access_token: "token".to_owned(),
        refresh_token: Some("refresh".to_owned()),
        token_expiry: Utc::now() + ChronoDuration::hours(1),
        last_sync: DateTime::<Utc>::UNIX_EPOCH,
        sync_frequency_minutes: 30,
        is_active: true,
    }
}
