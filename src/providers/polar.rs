// ABOUTME: Polar AccessLink adapter for sleep, nightly recharge, and daily activity data
// ABOUTME: Normalizes Polar night and recharge payloads into the canonical sample families
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! Polar AccessLink adapter.
//!
//! HRV and recovery both come from the nightly recharge collection; Polar's
//! 1-6 nightly recharge status is scaled onto the canonical 0-100 score.

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
// Polar API response structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct PolarNights {
    #[serde(default)]
    nights: Vec<PolarNight>,
}

#[derive(Debug, Deserialize)]
struct PolarNight {
    #[serde(default)]
    date: String,
    #[serde(default)]
    sleep_start_time: String,
    #[serde(default)]
    sleep_end_time: String,
    /// Seconds
    #[serde(default)]
    light_sleep: u32,
    #[serde(default)]
    deep_sleep: u32,
    #[serde(default)]
    rem_sleep: u32,
    #[serde(default)]
    total_interruption_duration: u32,
    sleep_score: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct PolarRecharges {
    #[serde(default)]
    recharges: Vec<PolarRecharge>,
}

#[derive(Debug, Deserialize)]
struct PolarRecharge {
    #[serde(default)]
    date: String,
    /// 1 (very poor) through 6 (very good)
    nightly_recharge_status: Option<u8>,
    hrv_avg: Option<f64>,
    heart_rate_avg: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PolarContinuousHeartRate {
    #[serde(default)]
    date: String,
    #[serde(default)]
    heart_rate_samples: Vec<PolarHeartRateSample>,
}

#[derive(Debug, Deserialize)]
struct PolarHeartRateSample {
    heart_rate: Option<u32>,
    #[serde(default)]
    sample_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PolarDailyActivity {
    #[serde(default)]
    date: String,
    #[serde(default)]
    active_steps: u64,
    #[serde(default)]
    calories: u32,
    /// Meters
    #[serde(default)]
    distance: f64,
    /// Minutes
    #[serde(default)]
    active_duration: u32,
}

// ============================================================================
// Adapter
// ============================================================================

/// Polar AccessLink adapter
pub struct PolarProvider {
    config: ProviderConfig,
}

impl PolarProvider {
    /// Build the adapter from environment configuration
    #[must_use]
    pub fn new() -> Self {
        let env = load_provider_env_config(
            provider_names::POLAR,
            "https://polarremote.com/v2/oauth2/token",
            "https://www.polaraccesslink.com/v3",
            None,
        );
        Self {
            config: ProviderConfig {
                name: provider_names::POLAR.to_owned(),
                token_url: env.token_url,
                api_base_url: env.api_base_url,
                revoke_url: env.revoke_url,
                probe_path: "users/me".to_owned(),
                client_id: env.client_id,
                client_secret: env.client_secret,
                auth: AuthScheme::Bearer,
                rate_limit: RateLimitBudget::per_minute(30),
            },
        }
    }

    /// Build the adapter with explicit configuration
    #[must_use]
    pub const fn with_config(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self, family: DataFamily, window: &FetchWindow) -> String {
        let end_date = window.end_date();
        let path = match family {
            // Continuous heart rate is a per-day resource; fetch the window end day
            DataFamily::HeartRate => format!("users/continuous-heart-rate/{end_date}"),
            DataFamily::Hrv | DataFamily::Recovery => "users/nightly-recharge".to_owned(),
            DataFamily::Sleep => "users/sleep".to_owned(),
            DataFamily::Activity => format!("users/daily-activity/{end_date}"),
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

    fn transform_heart_rate(response: PolarContinuousHeartRate) -> Vec<CanonicalSample> {
        let Some(date) = parse_date(&response.date) else {
            return Vec::new();
        };
        response
            .heart_rate_samples
            .into_iter()
            .filter_map(|sample| {
                let bpm = sample.heart_rate?;
                // sample_time is a wall-clock "HH:MM:SS" within the day
                let time =
                    chrono::NaiveTime::parse_from_str(&sample.sample_time, "%H:%M:%S").ok()?;
                Some(CanonicalSample::HeartRate(HeartRateSample {
                    timestamp: date.and_time(time).and_utc(),
                    bpm,
                    zone: None,
                }))
            })
            .collect()
    }

    fn transform_hrv(response: PolarRecharges) -> Vec<CanonicalSample> {
        response
            .recharges
            .into_iter()
            .filter_map(|recharge| {
                let date = parse_date(&recharge.date)?;
                let hrv = recharge.hrv_avg?;
                Some(CanonicalSample::Hrv(HrvSample {
                    timestamp: date.and_hms_opt(0, 0, 0)?.and_utc(),
                    hrv_ms: hrv,
                    rmssd: Some(hrv),
                    sdnn: None,
                }))
            })
            .collect()
    }

    fn transform_sleep(response: PolarNights) -> Vec<CanonicalSample> {
        response
            .nights
            .into_iter()
            .filter_map(|night| {
                let start = parse_timestamp(&night.sleep_start_time)?;
                let end = parse_timestamp(&night.sleep_end_time)?;

                let mut stages = Vec::new();
                for (kind, secs) in [
                    (SleepStageKind::Light, night.light_sleep),
                    (SleepStageKind::Deep, night.deep_sleep),
                    (SleepStageKind::Rem, night.rem_sleep),
                    (SleepStageKind::Awake, night.total_interruption_duration),
                ] {
                    if secs > 0 {
                        stages.push(SleepStage {
                            stage: kind,
                            start,
                            duration_minutes: secs / 60,
                        });
                    }
                }

                let asleep_minutes =
                    (night.light_sleep + night.deep_sleep + night.rem_sleep) / 60;

                Some(CanonicalSample::Sleep(SleepSession {
                    start,
                    end,
                    duration_minutes: asleep_minutes,
                    stages,
                    quality: night.sleep_score.unwrap_or(0).min(100),
                    efficiency: 0.0,
                }))
            })
            .collect()
    }

    fn transform_activity(activity: PolarDailyActivity) -> Vec<CanonicalSample> {
        let Some(date) = parse_date(&activity.date) else {
            return Vec::new();
        };
        vec![CanonicalSample::Activity(ActivitySummary {
            date,
            steps: activity.active_steps,
            distance_km: activity.distance / 1_000.0,
            calories: activity.calories,
            active_minutes: activity.active_duration,
        })]
    }

    fn transform_recovery(response: PolarRecharges) -> Vec<CanonicalSample> {
        response
            .recharges
            .into_iter()
            .filter_map(|recharge| {
                let date = parse_date(&recharge.date)?;
                // Scale the 1-6 recharge status onto 0-100
                let recovery_score = recharge
                    .nightly_recharge_status
                    .map_or(0, |status| (u32::from(status.min(6)) * 100 / 6) as u8);
                Some(CanonicalSample::Recovery(RecoveryScore {
                    date,
                    recovery_score,
                    hrv_score: recharge.hrv_avg.map(|v| v as f32),
                    resting_heart_rate: recharge.heart_rate_avg,
                    sleep_performance: None,
                    strain_yesterday: None,
                    baseline_deviation: None,
                    trend: None,
                }))
            })
            .collect()
    }
}

impl Default for PolarProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WearableProvider for PolarProvider {
    fn device_type(&self) -> DeviceType {
        DeviceType::Polar
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[instrument(skip(self, connection, window), fields(provider = "polar", %family))]
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
    fn recharge_status_scales_to_canonical_score() {
        let raw = json!({
            "recharges": [{
                "date": "2025-06-01",
                "nightly_recharge_status": 6,
                "hrv_avg": 58.0,
                "heart_rate_avg": 49
            }]
        });
        let samples = PolarProvider::new()
            .transform(&raw, DataFamily::Recovery)
            .unwrap();
        let CanonicalSample::Recovery(score) = &samples[0] else {
            panic!("expected recovery sample");
        };
        assert_eq!(score.recovery_score, 100);
        assert_eq!(score.resting_heart_rate, Some(49));
    }

    #[test]
    fn continuous_heart_rate_expands_per_sample() {
        let raw = json!({
            "date": "2025-06-01",
            "heart_rate_samples": [
                {"heart_rate": 72, "sample_time": "09:15:00"},
                {"heart_rate": 88, "sample_time": "09:20:00"},
                {"sample_time": "09:25:00"}
            ]
        });
        let samples = PolarProvider::new()
            .transform(&raw, DataFamily::HeartRate)
            .unwrap();
        assert_eq!(samples.len(), 2);
    }
}
