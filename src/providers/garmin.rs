// ABOUTME: Garmin Wellness API adapter for dailies, sleeps, and HRV summaries
// ABOUTME: Normalizes epoch-second Garmin payloads into the canonical sample families
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! Garmin wellness adapter.
//!
//! Garmin's wellness REST surface is summary-oriented: heart rate and
//! recovery both derive from the `dailies` payload (resting heart rate and
//! body battery respectively), sleep from `sleeps`, HRV from `hrv`.

use crate::config::load_provider_env_config;
use crate::constants::provider_names;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::{
    ActivitySummary, CanonicalSample, DataFamily, DeviceConnection, DeviceType, HeartRateSample,
    HrvSample, RecoveryScore, SleepSession, SleepStage, SleepStageKind,
};
use crate::providers::core::{
    parse_date, AuthScheme, FetchWindow, ProviderConfig, RateLimitBudget, WearableProvider,
};
use crate::providers::http;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

// ============================================================================
// Garmin API response structures
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminDaily {
    #[serde(default)]
    calendar_date: String,
    #[serde(default)]
    steps: u64,
    #[serde(default)]
    distance_in_meters: f64,
    #[serde(default)]
    active_kilocalories: u32,
    #[serde(default)]
    moderate_intensity_duration_in_seconds: u32,
    #[serde(default)]
    vigorous_intensity_duration_in_seconds: u32,
    resting_heart_rate_in_beats_per_minute: Option<u32>,
    body_battery_highest_value: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminSleep {
    start_time_in_seconds: Option<i64>,
    #[serde(default)]
    duration_in_seconds: u32,
    #[serde(default)]
    deep_sleep_duration_in_seconds: u32,
    #[serde(default)]
    light_sleep_duration_in_seconds: u32,
    #[serde(default)]
    rem_sleep_in_seconds: u32,
    #[serde(default)]
    awake_duration_in_seconds: u32,
    overall_sleep_score: Option<GarminSleepScore>,
}

#[derive(Debug, Deserialize)]
struct GarminSleepScore {
    #[serde(default)]
    value: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminHrvSummary {
    start_time_in_seconds: Option<i64>,
    last_night_avg: Option<f64>,
}

// ============================================================================
// Adapter
// ============================================================================

/// Garmin Wellness API adapter
pub struct GarminProvider {
    config: ProviderConfig,
}

impl GarminProvider {
    /// Build the adapter from environment configuration
    #[must_use]
    pub fn new() -> Self {
        let env = load_provider_env_config(
            provider_names::GARMIN,
            "https://connectapi.garmin.com/oauth-service/oauth/token",
            "https://apis.garmin.com/wellness-api/rest",
            Some("https://connectapi.garmin.com/oauth-service/oauth/revoke"),
        );
        Self {
            config: ProviderConfig {
                name: provider_names::GARMIN.to_owned(),
                token_url: env.token_url,
                api_base_url: env.api_base_url,
                revoke_url: env.revoke_url,
                probe_path: "user/id".to_owned(),
                client_id: env.client_id,
                client_secret: env.client_secret,
                auth: AuthScheme::Bearer,
                rate_limit: RateLimitBudget::per_minute(100),
            },
        }
    }

    /// Build the adapter with explicit configuration
    #[must_use]
    pub const fn with_config(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self, family: DataFamily, window: &FetchWindow) -> String {
        let start = window.since.timestamp();
        let end = window.until.timestamp();
        let resource = match family {
            DataFamily::HeartRate | DataFamily::Activity | DataFamily::Recovery => "dailies",
            DataFamily::Hrv => "hrv",
            DataFamily::Sleep => "sleeps",
        };
        self.config.api_url(&format!(
            "{resource}?uploadStartTimeInSeconds={start}&uploadEndTimeInSeconds={end}"
        ))
    }

    fn malformed(&self, family: DataFamily, err: &serde_json::Error) -> ProviderError {
        ProviderError::MalformedResponse {
            provider: self.config.name.clone(),
            context: family.as_str().to_owned(),
            message: err.to_string(),
        }
    }

    fn transform_heart_rate(dailies: Vec<GarminDaily>) -> Vec<CanonicalSample> {
        dailies
            .into_iter()
            .filter_map(|daily| {
                let date = parse_date(&daily.calendar_date)?;
                let bpm = daily.resting_heart_rate_in_beats_per_minute?;
                Some(CanonicalSample::HeartRate(HeartRateSample {
                    timestamp: date.and_hms_opt(0, 0, 0)?.and_utc(),
                    bpm,
                    zone: Some("resting".to_owned()),
                }))
            })
            .collect()
    }

    fn transform_hrv(summaries: Vec<GarminHrvSummary>) -> Vec<CanonicalSample> {
        summaries
            .into_iter()
            .filter_map(|summary| {
                let timestamp = DateTime::<Utc>::from_timestamp(summary.start_time_in_seconds?, 0)?;
                let avg = summary.last_night_avg?;
                Some(CanonicalSample::Hrv(HrvSample {
                    timestamp,
                    hrv_ms: avg,
                    rmssd: Some(avg),
                    sdnn: None,
                }))
            })
            .collect()
    }

    fn transform_sleep(sleeps: Vec<GarminSleep>) -> Vec<CanonicalSample> {
        sleeps
            .into_iter()
            .filter_map(|sleep| {
                let start = DateTime::<Utc>::from_timestamp(sleep.start_time_in_seconds?, 0)?;
                let end = start + chrono::Duration::seconds(i64::from(sleep.duration_in_seconds));

                let mut stages = Vec::new();
                for (kind, secs) in [
                    (SleepStageKind::Deep, sleep.deep_sleep_duration_in_seconds),
                    (SleepStageKind::Light, sleep.light_sleep_duration_in_seconds),
                    (SleepStageKind::Rem, sleep.rem_sleep_in_seconds),
                    (SleepStageKind::Awake, sleep.awake_duration_in_seconds),
                ] {
                    if secs > 0 {
                        stages.push(SleepStage {
                            stage: kind,
                            start,
                            duration_minutes: secs / 60,
                        });
                    }
                }

                Some(CanonicalSample::Sleep(SleepSession {
                    start,
                    end,
                    duration_minutes: sleep.duration_in_seconds / 60,
                    stages,
                    quality: sleep
                        .overall_sleep_score
                        .as_ref()
                        .map_or(0, |s| s.value.min(100)),
                    efficiency: 0.0,
                }))
            })
            .collect()
    }

    fn transform_activity(dailies: Vec<GarminDaily>) -> Vec<CanonicalSample> {
        dailies
            .into_iter()
            .filter_map(|daily| {
                let date = parse_date(&daily.calendar_date)?;
                Some(CanonicalSample::Activity(ActivitySummary {
                    date,
                    steps: daily.steps,
                    distance_km: daily.distance_in_meters / 1_000.0,
                    calories: daily.active_kilocalories,
                    active_minutes: (daily.moderate_intensity_duration_in_seconds
                        + daily.vigorous_intensity_duration_in_seconds)
                        / 60,
                }))
            })
            .collect()
    }

    fn transform_recovery(dailies: Vec<GarminDaily>) -> Vec<CanonicalSample> {
        dailies
            .into_iter()
            .filter_map(|daily| {
                let date = parse_date(&daily.calendar_date)?;
                Some(CanonicalSample::Recovery(RecoveryScore {
                    date,
                    // Body battery peak (0-100) is Garmin's recovery proxy
                    recovery_score: daily.body_battery_highest_value.unwrap_or(0).min(100),
                    hrv_score: None,
                    resting_heart_rate: daily.resting_heart_rate_in_beats_per_minute,
                    sleep_performance: None,
                    strain_yesterday: None,
                    baseline_deviation: None,
                    trend: None,
                }))
            })
            .collect()
    }
}

impl Default for GarminProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WearableProvider for GarminProvider {
    fn device_type(&self) -> DeviceType {
        DeviceType::Garmin
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[instrument(skip(self, connection, window), fields(provider = "garmin", %family))]
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
    fn dailies_feed_three_families() {
        let raw = json!([{
            "calendarDate": "2025-06-01",
            "steps": 11_542,
            "distanceInMeters": 8_230.5,
            "activeKilocalories": 640,
            "moderateIntensityDurationInSeconds": 1_800,
            "vigorousIntensityDurationInSeconds": 900,
            "restingHeartRateInBeatsPerMinute": 47,
            "bodyBatteryHighestValue": 82
        }]);
        let provider = GarminProvider::new();

        let activity = provider.transform(&raw, DataFamily::Activity).unwrap();
        let CanonicalSample::Activity(summary) = &activity[0] else {
            panic!("expected activity sample");
        };
        assert_eq!(summary.steps, 11_542);
        assert_eq!(summary.active_minutes, 45);

        let recovery = provider.transform(&raw, DataFamily::Recovery).unwrap();
        let CanonicalSample::Recovery(score) = &recovery[0] else {
            panic!("expected recovery sample");
        };
        assert_eq!(score.recovery_score, 82);

        let heart = provider.transform(&raw, DataFamily::HeartRate).unwrap();
        assert_eq!(heart.len(), 1);
    }

    #[test]
    fn sleep_without_score_defaults_quality_zero() {
        let raw = json!([{
            "startTimeInSeconds": 1_748_817_600_i64,
            "durationInSeconds": 27_000,
            "deepSleepDurationInSeconds": 5_400,
            "lightSleepDurationInSeconds": 14_400,
            "remSleepInSeconds": 6_000,
            "awakeDurationInSeconds": 1_200
        }]);
        let samples = GarminProvider::new().transform(&raw, DataFamily::Sleep).unwrap();
        let CanonicalSample::Sleep(session) = &samples[0] else {
            panic!("expected sleep sample");
        };
        assert_eq!(session.quality, 0);
        assert_eq!(session.duration_minutes, 450);
        assert_eq!(session.stages.len(), 4);
    }
}
