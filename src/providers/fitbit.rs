// ABOUTME: Fitbit Web API adapter for heart rate, HRV, sleep, activity, and readiness data
// ABOUTME: Normalizes Fitbit date-range payloads into the canonical sample families
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
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

// ============================================================================
// Fitbit API response structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct FitbitHeartResponse {
    #[serde(rename = "activities-heart", default)]
    days: Vec<FitbitHeartDay>,
}

#[derive(Debug, Deserialize)]
struct FitbitHeartDay {
    #[serde(rename = "dateTime", default)]
    date_time: String,
    #[serde(default)]
    value: FitbitHeartValue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FitbitHeartValue {
    resting_heart_rate: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FitbitHrvResponse {
    #[serde(default)]
    hrv: Vec<FitbitHrvDay>,
}

#[derive(Debug, Deserialize)]
struct FitbitHrvDay {
    #[serde(rename = "dateTime", default)]
    date_time: String,
    #[serde(default)]
    value: FitbitHrvValue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FitbitHrvValue {
    daily_rmssd: Option<f64>,
    deep_rmssd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FitbitSleepResponse {
    #[serde(default)]
    sleep: Vec<FitbitSleepLog>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FitbitSleepLog {
    #[serde(default)]
    start_time: String,
    #[serde(default)]
    end_time: String,
    #[serde(default)]
    minutes_asleep: u32,
    #[serde(default)]
    efficiency: u32,
    levels: Option<FitbitSleepLevels>,
}

#[derive(Debug, Deserialize)]
struct FitbitSleepLevels {
    summary: Option<FitbitSleepSummary>,
}

#[derive(Debug, Default, Deserialize)]
struct FitbitSleepSummary {
    deep: Option<FitbitStageSummary>,
    light: Option<FitbitStageSummary>,
    rem: Option<FitbitStageSummary>,
    wake: Option<FitbitStageSummary>,
}

#[derive(Debug, Deserialize)]
struct FitbitStageSummary {
    #[serde(default)]
    minutes: u32,
}

#[derive(Debug, Deserialize)]
struct FitbitActivityResponse {
    #[serde(default)]
    summary: FitbitActivitySummary,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FitbitActivitySummary {
    #[serde(default)]
    steps: u64,
    #[serde(default)]
    calories_out: u32,
    #[serde(default)]
    fairly_active_minutes: u32,
    #[serde(default)]
    very_active_minutes: u32,
    #[serde(default)]
    distances: Vec<FitbitDistance>,
}

#[derive(Debug, Deserialize)]
struct FitbitDistance {
    #[serde(default)]
    activity: String,
    #[serde(default)]
    distance: f64,
}

#[derive(Debug, Deserialize)]
struct FitbitReadinessResponse {
    #[serde(default)]
    readiness: Vec<FitbitReadinessDay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FitbitReadinessDay {
    #[serde(rename = "dateTime", default)]
    date_time: String,
    #[serde(default)]
    readiness_score: Option<u8>,
    #[serde(default)]
    hrv_contribution: Option<f32>,
    #[serde(default)]
    resting_heart_rate: Option<u32>,
    #[serde(default)]
    sleep_contribution: Option<f32>,
}

// ============================================================================
// Adapter
// ============================================================================

/// Fitbit Web API adapter
pub struct FitbitProvider {
    config: ProviderConfig,
}

impl FitbitProvider {
    /// Build the adapter from environment configuration
    #[must_use]
    pub fn new() -> Self {
        let env = load_provider_env_config(
            provider_names::FITBIT,
            "https://api.fitbit.com/oauth2/token",
            "https://api.fitbit.com/1",
            Some("https://api.fitbit.com/oauth2/revoke"),
        );
        Self {
            config: ProviderConfig {
                name: provider_names::FITBIT.to_owned(),
                token_url: env.token_url,
                api_base_url: env.api_base_url,
                revoke_url: env.revoke_url,
                probe_path: "user/-/profile.json".to_owned(),
                client_id: env.client_id,
                client_secret: env.client_secret,
                auth: AuthScheme::Bearer,
                rate_limit: RateLimitBudget::per_hour(150),
            },
        }
    }

    /// Build the adapter with explicit configuration
    #[must_use]
    pub const fn with_config(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self, family: DataFamily, window: &FetchWindow) -> String {
        let start = window.start_date();
        let end = window.end_date();
        let path = match family {
            DataFamily::HeartRate => {
                format!("user/-/activities/heart/date/{start}/{end}.json")
            }
            DataFamily::Hrv => format!("user/-/hrv/date/{start}/{end}.json"),
            DataFamily::Sleep => format!("user/-/sleep/date/{start}/{end}.json"),
            DataFamily::Activity => format!("user/-/activities/date/{end}.json"),
            DataFamily::Recovery => format!("user/-/readiness/date/{start}/{end}.json"),
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

    fn transform_heart_rate(response: FitbitHeartResponse) -> Vec<CanonicalSample> {
        response
            .days
            .into_iter()
            .filter_map(|day| {
                let date = parse_date(&day.date_time)?;
                let bpm = day.value.resting_heart_rate?;
                Some(CanonicalSample::HeartRate(HeartRateSample {
                    timestamp: date.and_hms_opt(0, 0, 0)?.and_utc(),
                    bpm,
                    zone: Some("resting".to_owned()),
                }))
            })
            .collect()
    }

    fn transform_hrv(response: FitbitHrvResponse) -> Vec<CanonicalSample> {
        response
            .hrv
            .into_iter()
            .filter_map(|day| {
                let date = parse_date(&day.date_time)?;
                let rmssd = day.value.daily_rmssd.or(day.value.deep_rmssd)?;
                Some(CanonicalSample::Hrv(HrvSample {
                    timestamp: date.and_hms_opt(0, 0, 0)?.and_utc(),
                    hrv_ms: rmssd,
                    rmssd: Some(rmssd),
                    sdnn: None,
                }))
            })
            .collect()
    }

    fn transform_sleep(response: FitbitSleepResponse) -> Vec<CanonicalSample> {
        response
            .sleep
            .into_iter()
            .filter_map(|log| {
                let start = parse_timestamp(&log.start_time)?;
                let end = parse_timestamp(&log.end_time)?;

                // Fitbit reports aggregate stage durations, not intervals, so
                // every stage is anchored at session start.
                let mut stages = Vec::new();
                if let Some(summary) = log.levels.as_ref().and_then(|l| l.summary.as_ref()) {
                    for (kind, stage) in [
                        (SleepStageKind::Deep, summary.deep.as_ref()),
                        (SleepStageKind::Light, summary.light.as_ref()),
                        (SleepStageKind::Rem, summary.rem.as_ref()),
                        (SleepStageKind::Awake, summary.wake.as_ref()),
                    ] {
                        if let Some(stage) = stage {
                            stages.push(SleepStage {
                                stage: kind,
                                start,
                                duration_minutes: stage.minutes,
                            });
                        }
                    }
                }

                Some(CanonicalSample::Sleep(SleepSession {
                    start,
                    end,
                    duration_minutes: log.minutes_asleep,
                    stages,
                    quality: log.efficiency.min(100) as u8,
                    efficiency: log.efficiency.min(100) as f32,
                }))
            })
            .collect()
    }

    // The daily activity payload carries no date of its own; it describes the
    // day it was requested for, which is always the window end (today).
    fn transform_activity(response: FitbitActivityResponse) -> Vec<CanonicalSample> {
        let summary = response.summary;
        let distance_km = summary
            .distances
            .iter()
            .find(|d| d.activity == "total")
            .map_or(0.0, |d| d.distance);

        vec![CanonicalSample::Activity(ActivitySummary {
            date: Utc::now().date_naive(),
            steps: summary.steps,
            distance_km,
            calories: summary.calories_out,
            active_minutes: summary.fairly_active_minutes + summary.very_active_minutes,
        })]
    }

    fn transform_recovery(response: FitbitReadinessResponse) -> Vec<CanonicalSample> {
        response
            .readiness
            .into_iter()
            .filter_map(|day| {
                let date = parse_date(&day.date_time)?;
                Some(CanonicalSample::Recovery(RecoveryScore {
                    date,
                    recovery_score: day.readiness_score.unwrap_or(0),
                    hrv_score: day.hrv_contribution,
                    resting_heart_rate: day.resting_heart_rate,
                    sleep_performance: day.sleep_contribution,
                    strain_yesterday: None,
                    baseline_deviation: None,
                    trend: None,
                }))
            })
            .collect()
    }
}

impl Default for FitbitProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WearableProvider for FitbitProvider {
    fn device_type(&self) -> DeviceType {
        DeviceType::Fitbit
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[instrument(skip(self, connection, window), fields(provider = "fitbit", %family))]
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
