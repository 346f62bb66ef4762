// ABOUTME: Companion-app bridge adapter for wearables without public cloud APIs
// ABOUTME: Serves Apple Watch (HealthKit) and Samsung Health through the app's bridge service
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! Bridge adapter.
//!
//! Apple Watch and Samsung Health expose no public cloud REST APIs; the
//! companion mobile app uploads HealthKit / Samsung Health data to the
//! backend's bridge service, which this adapter reads like any other
//! provider. The bridge speaks a near-canonical JSON shape:
//!
//! ```json
//! { "samples": [ { "timestamp": "...", "bpm": 62, "zone": "rest" } ] }
//! ```
//!
//! Apple Watch authenticates with a bearer token; Samsung Health uses a
//! header-based bridge key.

use crate::config::load_provider_env_config;
use crate::constants::provider_names;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::{
    ActivitySummary, CanonicalSample, DataFamily, DeviceConnection, DeviceType, HeartRateSample,
    HrvSample, RecoveryScore, SleepSession, SleepStage, SleepStageKind,
};
use crate::providers::core::{
    parse_date, parse_timestamp, AuthScheme, FetchWindow, ProviderConfig, RateLimitBudget,
    WearableProvider,
};
use crate::providers::http;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

// ============================================================================
// Bridge response structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct BridgeEnvelope {
    #[serde(default)]
    samples: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct BridgeHeartRate {
    #[serde(default)]
    timestamp: String,
    bpm: Option<u32>,
    zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BridgeHrv {
    #[serde(default)]
    timestamp: String,
    rmssd: Option<f64>,
    sdnn: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BridgeSleepStage {
    #[serde(default)]
    stage: String,
    #[serde(default)]
    start: String,
    #[serde(default)]
    duration_minutes: u32,
}

#[derive(Debug, Deserialize)]
struct BridgeSleep {
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
    #[serde(default)]
    duration_minutes: u32,
    #[serde(default)]
    stages: Vec<BridgeSleepStage>,
    quality: Option<u8>,
    efficiency: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct BridgeActivity {
    #[serde(default)]
    date: String,
    #[serde(default)]
    steps: u64,
    #[serde(default)]
    distance_km: f64,
    #[serde(default)]
    calories: u32,
    #[serde(default)]
    active_minutes: u32,
}

#[derive(Debug, Deserialize)]
struct BridgeRecovery {
    #[serde(default)]
    date: String,
    recovery_score: Option<u8>,
    hrv_score: Option<f32>,
    resting_heart_rate: Option<u32>,
    sleep_performance: Option<f32>,
}

// ============================================================================
// Adapter
// ============================================================================

/// Bridge-service adapter serving Apple Watch and Samsung Health
pub struct BridgeProvider {
    device_type: DeviceType,
    config: ProviderConfig,
}

impl BridgeProvider {
    /// Bridge adapter for Apple Watch (HealthKit upload path)
    #[must_use]
    pub fn apple_watch() -> Self {
        let env = load_provider_env_config(
            provider_names::APPLE_WATCH,
            "http://localhost:8700/bridge/oauth/token",
            "http://localhost:8700/bridge/apple_watch",
            None,
        );
        Self {
            device_type: DeviceType::AppleWatch,
            config: ProviderConfig {
                name: provider_names::APPLE_WATCH.to_owned(),
                token_url: env.token_url,
                api_base_url: env.api_base_url,
                revoke_url: env.revoke_url,
                probe_path: "status".to_owned(),
                client_id: env.client_id,
                client_secret: env.client_secret,
                auth: AuthScheme::Bearer,
                rate_limit: RateLimitBudget::per_minute(240),
            },
        }
    }

    /// Bridge adapter for Samsung Health
    #[must_use]
    pub fn samsung() -> Self {
        let env = load_provider_env_config(
            provider_names::SAMSUNG,
            "http://localhost:8700/bridge/oauth/token",
            "http://localhost:8700/bridge/samsung",
            None,
        );
        Self {
            device_type: DeviceType::Samsung,
            config: ProviderConfig {
                name: provider_names::SAMSUNG.to_owned(),
                token_url: env.token_url,
                api_base_url: env.api_base_url,
                revoke_url: env.revoke_url,
                probe_path: "status".to_owned(),
                client_id: env.client_id,
                client_secret: env.client_secret,
                auth: AuthScheme::ApiKeyHeader {
                    header: "X-Bridge-Key".to_owned(),
                },
                rate_limit: RateLimitBudget::per_minute(240),
            },
        }
    }

    /// Build a bridge adapter with explicit configuration
    #[must_use]
    pub const fn with_config(device_type: DeviceType, config: ProviderConfig) -> Self {
        Self {
            device_type,
            config,
        }
    }

    fn malformed(&self, family: DataFamily, message: String) -> ProviderError {
        ProviderError::MalformedResponse {
            provider: self.config.name.clone(),
            context: family.as_str().to_owned(),
            message,
        }
    }

    fn parse_stage_kind(stage: &str) -> Option<SleepStageKind> {
        match stage {
            "awake" => Some(SleepStageKind::Awake),
            "light" => Some(SleepStageKind::Light),
            "deep" => Some(SleepStageKind::Deep),
            "rem" => Some(SleepStageKind::Rem),
            _ => None,
        }
    }

    fn transform_one(family: DataFamily, sample: Value) -> Option<CanonicalSample> {
        match family {
            DataFamily::HeartRate => {
                let hr: BridgeHeartRate = serde_json::from_value(sample).ok()?;
                Some(CanonicalSample::HeartRate(HeartRateSample {
                    timestamp: parse_timestamp(&hr.timestamp)?,
                    bpm: hr.bpm?,
                    zone: hr.zone,
                }))
            }
            DataFamily::Hrv => {
                let hrv: BridgeHrv = serde_json::from_value(sample).ok()?;
                let primary = hrv.rmssd.or(hrv.sdnn)?;
                Some(CanonicalSample::Hrv(HrvSample {
                    timestamp: parse_timestamp(&hrv.timestamp)?,
                    hrv_ms: primary,
                    rmssd: hrv.rmssd,
                    sdnn: hrv.sdnn,
                }))
            }
            DataFamily::Sleep => {
                let sleep: BridgeSleep = serde_json::from_value(sample).ok()?;
                let start = parse_timestamp(&sleep.start)?;
                let stages = sleep
                    .stages
                    .into_iter()
                    .filter_map(|stage| {
                        Some(SleepStage {
                            stage: Self::parse_stage_kind(&stage.stage)?,
                            start: parse_timestamp(&stage.start).unwrap_or(start),
                            duration_minutes: stage.duration_minutes,
                        })
                    })
                    .collect();
                Some(CanonicalSample::Sleep(SleepSession {
                    start,
                    end: parse_timestamp(&sleep.end)?,
                    duration_minutes: sleep.duration_minutes,
                    stages,
                    quality: sleep.quality.unwrap_or(0).min(100),
                    efficiency: sleep.efficiency.unwrap_or(0.0).clamp(0.0, 100.0),
                }))
            }
            DataFamily::Activity => {
                let activity: BridgeActivity = serde_json::from_value(sample).ok()?;
                Some(CanonicalSample::Activity(ActivitySummary {
                    date: parse_date(&activity.date)?,
                    steps: activity.steps,
                    distance_km: activity.distance_km,
                    calories: activity.calories,
                    active_minutes: activity.active_minutes,
                }))
            }
            DataFamily::Recovery => {
                let recovery: BridgeRecovery = serde_json::from_value(sample).ok()?;
                Some(CanonicalSample::Recovery(RecoveryScore {
                    date: parse_date(&recovery.date)?,
                    recovery_score: recovery.recovery_score.unwrap_or(0).min(100),
                    hrv_score: recovery.hrv_score,
                    resting_heart_rate: recovery.resting_heart_rate,
                    sleep_performance: recovery.sleep_performance,
                    strain_yesterday: None,
                    baseline_deviation: None,
                    trend: None,
                }))
            }
        }
    }
}

#[async_trait]
impl WearableProvider for BridgeProvider {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[instrument(skip(self, connection, window), fields(provider = %self.config.name, %family))]
    async fn fetch(
        &self,
        connection: &DeviceConnection,
        family: DataFamily,
        window: &FetchWindow,
    ) -> ProviderResult<Value> {
        let url = self.config.api_url(&format!(
            "{}?since={}&until={}",
            family.as_str(),
            window.since_rfc3339(),
            window.until_rfc3339()
        ));
        http::get_json(
            &self.config.name,
            family,
            &self.config.auth,
            &connection.access_token,
            &url,
        )
        .await
    }

    fn transform(&self, raw: &Value, family: DataFamily) -> ProviderResult<Vec<CanonicalSample>> {
        let envelope: BridgeEnvelope = serde_json::from_value(raw.clone())
            .map_err(|e| self.malformed(family, e.to_string()))?;

        Ok(envelope
            .samples
            .into_iter()
            .filter_map(|sample| Self::transform_one(family, sample))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apple_and_samsung_differ_only_in_auth_and_type() {
        let apple = BridgeProvider::apple_watch();
        let samsung = BridgeProvider::samsung();
        assert_eq!(apple.device_type(), DeviceType::AppleWatch);
        assert_eq!(samsung.device_type(), DeviceType::Samsung);
        assert!(matches!(apple.config().auth, AuthScheme::Bearer));
        assert!(matches!(
            samsung.config().auth,
            AuthScheme::ApiKeyHeader { .. }
        ));
    }

    #[test]
    fn malformed_items_are_skipped_not_fatal() {
        let raw = json!({
            "samples": [
                {"timestamp": "2025-06-01T08:00:00Z", "bpm": 58},
                {"timestamp": "not-a-time", "bpm": 60},
                {"bpm": 61}
            ]
        });
        let samples = BridgeProvider::apple_watch()
            .transform(&raw, DataFamily::HeartRate)
            .unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn sleep_stage_names_parse_leniently() {
        let raw = json!({
            "samples": [{
                "start": "2025-06-01T23:00:00Z",
                "end": "2025-06-02T06:30:00Z",
                "duration_minutes": 420,
                "quality": 81,
                "efficiency": 92.0,
                "stages": [
                    {"stage": "deep", "start": "2025-06-01T23:40:00Z", "duration_minutes": 80},
                    {"stage": "mystery", "start": "2025-06-02T01:00:00Z", "duration_minutes": 10}
                ]
            }]
        });
        let samples = BridgeProvider::samsung()
            .transform(&raw, DataFamily::Sleep)
            .unwrap();
        let CanonicalSample::Sleep(session) = &samples[0] else {
            panic!("expected sleep sample");
        };
        assert_eq!(session.stages.len(), 1);
        assert_eq!(session.quality, 81);
    }
}
