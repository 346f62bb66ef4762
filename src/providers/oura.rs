// ABOUTME: Oura API v2 adapter for heart rate, sleep, daily activity, and readiness data
// ABOUTME: Normalizes Oura usercollection payloads into the canonical sample families
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

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
// Oura API response structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct OuraCollection<T> {
    #[serde(default)]
    data: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct OuraHeartRate {
    #[serde(default)]
    timestamp: String,
    bpm: Option<u32>,
    source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OuraSleep {
    #[serde(default)]
    bedtime_start: String,
    #[serde(default)]
    bedtime_end: String,
    /// Seconds asleep
    #[serde(default)]
    total_sleep_duration: u32,
    #[serde(default)]
    deep_sleep_duration: u32,
    #[serde(default)]
    light_sleep_duration: u32,
    #[serde(default)]
    rem_sleep_duration: u32,
    #[serde(default)]
    awake_time: u32,
    efficiency: Option<u8>,
    average_hrv: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OuraDailyActivity {
    #[serde(default)]
    day: String,
    #[serde(default)]
    steps: u64,
    #[serde(default)]
    total_calories: u32,
    /// Meters
    #[serde(default)]
    equivalent_walking_distance: f64,
    /// Seconds
    #[serde(default)]
    high_activity_time: u32,
    #[serde(default)]
    medium_activity_time: u32,
}

#[derive(Debug, Default, Deserialize)]
struct OuraDailyReadiness {
    #[serde(default)]
    day: String,
    score: Option<u8>,
    temperature_deviation: Option<f32>,
    #[serde(default)]
    contributors: OuraReadinessContributors,
}

#[derive(Debug, Default, Deserialize)]
struct OuraReadinessContributors {
    hrv_balance: Option<f32>,
    previous_night: Option<f32>,
}

// ============================================================================
// Adapter
// ============================================================================

/// Oura API v2 adapter
pub struct OuraProvider {
    config: ProviderConfig,
}

impl OuraProvider {
    /// Build the adapter from environment configuration
    #[must_use]
    pub fn new() -> Self {
        let env = load_provider_env_config(
            provider_names::OURA,
            "https://api.ouraring.com/oauth/token",
            "https://api.ouraring.com/v2",
            Some("https://api.ouraring.com/oauth/revoke"),
        );
        Self {
            config: ProviderConfig {
                name: provider_names::OURA.to_owned(),
                token_url: env.token_url,
                api_base_url: env.api_base_url,
                revoke_url: env.revoke_url,
                probe_path: "usercollection/personal_info".to_owned(),
                client_id: env.client_id,
                client_secret: env.client_secret,
                auth: AuthScheme::Bearer,
                rate_limit: RateLimitBudget::per_minute(60),
            },
        }
    }

    /// Build the adapter with explicit configuration
    #[must_use]
    pub const fn with_config(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self, family: DataFamily, window: &FetchWindow) -> String {
        let start_date = window.start_date();
        let end_date = window.end_date();
        let path = match family {
            DataFamily::HeartRate => format!(
                "usercollection/heartrate?start_datetime={}&end_datetime={}",
                window.since_rfc3339(),
                window.until_rfc3339()
            ),
            // HRV rides on the sleep collection (average_hrv per night)
            DataFamily::Hrv | DataFamily::Sleep => format!(
                "usercollection/sleep?start_date={start_date}&end_date={end_date}"
            ),
            DataFamily::Activity => format!(
                "usercollection/daily_activity?start_date={start_date}&end_date={end_date}"
            ),
            DataFamily::Recovery => format!(
                "usercollection/daily_readiness?start_date={start_date}&end_date={end_date}"
            ),
        };
        self.config.api_url(&path)
    }

    fn malformed(&self, family: DataFamily, err: &serde_json::Error) -> ProviderError {
        ProviderError::MalformedResponse {
            provider: self.config.name.clone(),
            context: family.as_str().to_owned(),
            message: err.to_string(),
        }
    }

    fn transform_heart_rate(response: OuraCollection<OuraHeartRate>) -> Vec<CanonicalSample> {
        response
            .data
            .into_iter()
            .filter_map(|sample| {
                let timestamp = parse_timestamp(&sample.timestamp)?;
                let bpm = sample.bpm?;
                Some(CanonicalSample::HeartRate(HeartRateSample {
                    timestamp,
                    bpm,
                    zone: sample.source,
                }))
            })
            .collect()
    }

    fn transform_hrv(response: OuraCollection<OuraSleep>) -> Vec<CanonicalSample> {
        response
            .data
            .into_iter()
            .filter_map(|sleep| {
                let timestamp = parse_timestamp(&sleep.bedtime_end)?;
                let hrv = sleep.average_hrv?;
                Some(CanonicalSample::Hrv(HrvSample {
                    timestamp,
                    hrv_ms: hrv,
                    rmssd: Some(hrv),
                    sdnn: None,
                }))
            })
            .collect()
    }

    fn transform_sleep(response: OuraCollection<OuraSleep>) -> Vec<CanonicalSample> {
        response
            .data
            .into_iter()
            .filter_map(|sleep| {
                let start = parse_timestamp(&sleep.bedtime_start)?;
                let end = parse_timestamp(&sleep.bedtime_end)?;

                let mut stages = Vec::new();
                for (kind, secs) in [
                    (SleepStageKind::Deep, sleep.deep_sleep_duration),
                    (SleepStageKind::Light, sleep.light_sleep_duration),
                    (SleepStageKind::Rem, sleep.rem_sleep_duration),
                    (SleepStageKind::Awake, sleep.awake_time),
                ] {
                    if secs > 0 {
                        stages.push(SleepStage {
                            stage: kind,
                            start,
                            duration_minutes: secs / 60,
                        });
                    }
                }

                let efficiency = sleep.efficiency.unwrap_or(0).min(100);
                Some(CanonicalSample::Sleep(SleepSession {
                    start,
                    end,
                    duration_minutes: sleep.total_sleep_duration / 60,
                    stages,
                    quality: efficiency,
                    efficiency: f32::from(efficiency),
                }))
            })
            .collect()
    }

    fn transform_activity(response: OuraCollection<OuraDailyActivity>) -> Vec<CanonicalSample> {
        response
            .data
            .into_iter()
            .filter_map(|activity| {
                let date = parse_date(&activity.day)?;
                Some(CanonicalSample::Activity(ActivitySummary {
                    date,
                    steps: activity.steps,
                    distance_km: activity.equivalent_walking_distance / 1_000.0,
                    calories: activity.total_calories,
                    active_minutes: (activity.high_activity_time + activity.medium_activity_time)
                        / 60,
                }))
            })
            .collect()
    }

    fn transform_recovery(response: OuraCollection<OuraDailyReadiness>) -> Vec<CanonicalSample> {
        response
            .data
            .into_iter()
            .filter_map(|readiness| {
                let date = parse_date(&readiness.day)?;
                Some(CanonicalSample::Recovery(RecoveryScore {
                    date,
                    recovery_score: readiness.score.unwrap_or(0).min(100),
                    hrv_score: readiness.contributors.hrv_balance,
                    resting_heart_rate: None,
                    sleep_performance: readiness.contributors.previous_night,
                    strain_yesterday: None,
                    baseline_deviation: readiness.temperature_deviation,
                    trend: None,
                }))
            })
            .collect()
    }
}

impl Default for OuraProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WearableProvider for OuraProvider {
    fn device_type(&self) -> DeviceType {
        DeviceType::Oura
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[instrument(skip(self, connection, window), fields(provider = "oura", %family))]
    async fn fetch(
        &self,
        connection: &DeviceConnection,
        family: DataFamily,
        window: &FetchWindow,
    ) -> ProviderResult<Value> {
        let url = self.endpoint(family, window);
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
        match family {
            DataFamily::HeartRate => serde_json::from_value(raw.clone())
                .map(Self::transform_heart_rate)
                .map_err(|e| self.malformed(family, &e)),
            DataFamily::Hrv => serde_json::from_value(raw.clone())
                .map(Self::transform_hrv)
                .map_err(|e| self.malformed(family, &e)),
            DataFamily::Sleep => serde_json::from_value(raw.clone())
                .map(Self::transform_sleep)
                .map_err(|e| self.malformed(family, &e)),
            DataFamily::Activity => serde_json::from_value(raw.clone())
                .map(Self::transform_activity)
                .map_err(|e| self.malformed(family, &e)),
            DataFamily::Recovery => serde_json::from_value(raw.clone())
                .map(Self::transform_recovery)
                .map_err(|e| self.malformed(family, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn heartrate_samples_carry_source_as_zone() {
        let raw = json!({
            "data": [
                {"timestamp": "2025-06-01T10:15:00+00:00", "bpm": 64, "source": "awake"},
                {"timestamp": "2025-06-01T10:20:00+00:00"}
            ]
        });
        let samples = OuraProvider::new()
            .transform(&raw, DataFamily::HeartRate)
            .unwrap();
        assert_eq!(samples.len(), 1);
        let CanonicalSample::HeartRate(hr) = &samples[0] else {
            panic!("expected heart rate sample");
        };
        assert_eq!(hr.zone.as_deref(), Some("awake"));
    }

    #[test]
    fn readiness_maps_contributors() {
        let raw = json!({
            "data": [{
                "day": "2025-06-01",
                "score": 84,
                "temperature_deviation": -0.2,
                "contributors": {"hrv_balance": 78.0, "previous_night": 91.0}
            }]
        });
        let samples = OuraProvider::new()
            .transform(&raw, DataFamily::Recovery)
            .unwrap();
        let CanonicalSample::Recovery(score) = &samples[0] else {
            panic!("expected recovery sample");
        };
        assert_eq!(score.recovery_score, 84);
        assert_eq!(score.hrv_score, Some(78.0));
        assert_eq!(score.baseline_deviation, Some(-0.2));
    }

    #[test]
    fn empty_collection_transforms_to_no_samples() {
        let raw = json!({"data": []});
        for family in DataFamily::ALL {
            if family == DataFamily::HeartRate {
                continue;
            }
            let samples = OuraProvider::new().transform(&raw, family).unwrap();
            assert!(samples.is_empty(), "{family} should be empty");
        }
    }
}
