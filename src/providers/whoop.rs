// ABOUTME: WHOOP developer API adapter for cycles, recovery, sleep, and workout data
// ABOUTME: Normalizes WHOOP record collections into the canonical sample families
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
    parse_timestamp, AuthScheme, FetchWindow, ProviderConfig, RateLimitBudget, WearableProvider,
};
use crate::providers::http;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

/// Kilojoules to kilocalories
const KJ_TO_KCAL: f64 = 0.239;

// ============================================================================
// WHOOP API response structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct WhoopCollection<T> {
    #[serde(default)]
    records: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct WhoopCycle {
    #[serde(default)]
    start: String,
    score: Option<WhoopCycleScore>,
}

#[derive(Debug, Default, Deserialize)]
struct WhoopCycleScore {
    average_heart_rate: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WhoopRecovery {
    #[serde(default)]
    created_at: String,
    score: Option<WhoopRecoveryScore>,
}

#[derive(Debug, Default, Deserialize)]
struct WhoopRecoveryScore {
    recovery_score: Option<f64>,
    resting_heart_rate: Option<f64>,
    hrv_rmssd_milli: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhoopSleep {
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
    score: Option<WhoopSleepScore>,
}

#[derive(Debug, Default, Deserialize)]
struct WhoopSleepScore {
    stage_summary: Option<WhoopStageSummary>,
    sleep_performance_percentage: Option<f64>,
    sleep_efficiency_percentage: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhoopStageSummary {
    total_awake_time_milli: Option<i64>,
    total_light_sleep_time_milli: Option<i64>,
    total_slow_wave_sleep_time_milli: Option<i64>,
    total_rem_sleep_time_milli: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhoopWorkout {
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
    score: Option<WhoopWorkoutScore>,
}

#[derive(Debug, Default, Deserialize)]
struct WhoopWorkoutScore {
    kilojoule: Option<f64>,
    distance_meter: Option<f64>,
}

// ============================================================================
// Adapter
// ============================================================================

/// WHOOP developer API adapter
pub struct WhoopProvider {
    config: ProviderConfig,
}

impl WhoopProvider {
    /// Build the adapter from environment configuration
    #[must_use]
    pub fn new() -> Self {
        let env = load_provider_env_config(
            provider_names::WHOOP,
            "https://api.prod.whoop.com/oauth/oauth2/token",
            "https://api.prod.whoop.com/developer/v1",
            Some("https://api.prod.whoop.com/oauth/oauth2/revoke"),
        );
        Self {
            config: ProviderConfig {
                name: provider_names::WHOOP.to_owned(),
                token_url: env.token_url,
                api_base_url: env.api_base_url,
                revoke_url: env.revoke_url,
                probe_path: "user/profile/basic".to_owned(),
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
        let start = window.since_rfc3339();
        let end = window.until_rfc3339();
        let path = match family {
            // WHOOP exposes no intraday heart rate; cycle averages stand in.
            DataFamily::HeartRate => format!("cycle?start={start}&end={end}&limit=25"),
            DataFamily::Hrv | DataFamily::Recovery => {
                format!("recovery?start={start}&end={end}&limit=25")
            }
            DataFamily::Sleep => format!("activity/sleep?start={start}&end={end}&limit=25"),
            DataFamily::Activity => format!("activity/workout?start={start}&end={end}&limit=25"),
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

    fn transform_heart_rate(response: WhoopCollection<WhoopCycle>) -> Vec<CanonicalSample> {
        response
            .records
            .into_iter()
            .filter_map(|cycle| {
                let timestamp = parse_timestamp(&cycle.start)?;
                let bpm = cycle.score.as_ref()?.average_heart_rate?;
                Some(CanonicalSample::HeartRate(HeartRateSample {
                    timestamp,
                    bpm,
                    zone: None,
                }))
            })
            .collect()
    }

    fn transform_hrv(response: WhoopCollection<WhoopRecovery>) -> Vec<CanonicalSample> {
        response
            .records
            .into_iter()
            .filter_map(|recovery| {
                let timestamp = parse_timestamp(&recovery.created_at)?;
                let rmssd = recovery.score.as_ref()?.hrv_rmssd_milli?;
                Some(CanonicalSample::Hrv(HrvSample {
                    timestamp,
                    hrv_ms: rmssd,
                    rmssd: Some(rmssd),
                    sdnn: None,
                }))
            })
            .collect()
    }

    fn transform_sleep(response: WhoopCollection<WhoopSleep>) -> Vec<CanonicalSample> {
        response
            .records
            .into_iter()
            .filter_map(|sleep| {
                let start = parse_timestamp(&sleep.start)?;
                let end = parse_timestamp(&sleep.end)?;
                let score = sleep.score.as_ref();
                let summary = score.and_then(|s| s.stage_summary.as_ref());

                // Stage durations are summary totals anchored at session start.
                let mut stages = Vec::new();
                if let Some(summary) = summary {
                    for (kind, millis) in [
                        (SleepStageKind::Awake, summary.total_awake_time_milli),
                        (SleepStageKind::Light, summary.total_light_sleep_time_milli),
                        (SleepStageKind::Deep, summary.total_slow_wave_sleep_time_milli),
                        (SleepStageKind::Rem, summary.total_rem_sleep_time_milli),
                    ] {
                        if let Some(ms) = millis {
                            if ms > 0 {
                                stages.push(SleepStage {
                                    stage: kind,
                                    start,
                                    duration_minutes: (ms / 60_000) as u32,
                                });
                            }
                        }
                    }
                }

                let asleep_minutes: u32 = stages
                    .iter()
                    .filter(|s| s.stage != SleepStageKind::Awake)
                    .map(|s| s.duration_minutes)
                    .sum();

                Some(CanonicalSample::Sleep(SleepSession {
                    start,
                    end,
                    duration_minutes: asleep_minutes,
                    stages,
                    quality: score
                        .and_then(|s| s.sleep_performance_percentage)
                        .map_or(0, |p| p.clamp(0.0, 100.0) as u8),
                    efficiency: score
                        .and_then(|s| s.sleep_efficiency_percentage)
                        .map_or(0.0, |p| p.clamp(0.0, 100.0) as f32),
                }))
            })
            .collect()
    }

    fn transform_activity(response: WhoopCollection<WhoopWorkout>) -> Vec<CanonicalSample> {
        response
            .records
            .into_iter()
            .filter_map(|workout| {
                let start = parse_timestamp(&workout.start)?;
                let end = parse_timestamp(&workout.end)?;
                let score = workout.score.as_ref();
                let active_minutes = (end - start).num_minutes().max(0) as u32;
                Some(CanonicalSample::Activity(ActivitySummary {
                    date: start.date_naive(),
                    // WHOOP does not track steps
                    steps: 0,
                    distance_km: score
                        .and_then(|s| s.distance_meter)
                        .map_or(0.0, |m| m / 1_000.0),
                    calories: score
                        .and_then(|s| s.kilojoule)
                        .map_or(0, |kj| (kj * KJ_TO_KCAL) as u32),
                    active_minutes,
                }))
            })
            .collect()
    }

    fn transform_recovery(response: WhoopCollection<WhoopRecovery>) -> Vec<CanonicalSample> {
        response
            .records
            .into_iter()
            .filter_map(|recovery| {
                let timestamp = parse_timestamp(&recovery.created_at)?;
                let score = recovery.score.as_ref();
                Some(CanonicalSample::Recovery(RecoveryScore {
                    date: timestamp.date_naive(),
                    recovery_score: score
                        .and_then(|s| s.recovery_score)
                        .map_or(0, |s| s.clamp(0.0, 100.0) as u8),
                    hrv_score: score.and_then(|s| s.hrv_rmssd_milli).map(|v| v as f32),
                    resting_heart_rate: score
                        .and_then(|s| s.resting_heart_rate)
                        .map(|hr| hr as u32),
                    sleep_performance: None,
                    strain_yesterday: None,
                    baseline_deviation: None,
                    trend: None,
                }))
            })
            .collect()
    }
}

impl Default for WhoopProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WearableProvider for WhoopProvider {
    fn device_type(&self) -> DeviceType {
        DeviceType::Whoop
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[instrument(skip(self, connection, window), fields(provider = "whoop", %family))]
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
    fn sleep_stages_convert_from_millis() {
        let raw = json!({
            "records": [{
                "start": "2025-06-01T23:00:00.000Z",
                "end": "2025-06-02T07:00:00.000Z",
                "score": {
                    "stage_summary": {
                        "total_awake_time_milli": 1_800_000,
                        "total_light_sleep_time_milli": 14_400_000,
                        "total_slow_wave_sleep_time_milli": 5_400_000,
                        "total_rem_sleep_time_milli": 6_000_000
                    },
                    "sleep_performance_percentage": 88.0,
                    "sleep_efficiency_percentage": 94.5
                }
            }]
        });
        let samples = WhoopProvider::new().transform(&raw, DataFamily::Sleep).unwrap();
        let CanonicalSample::Sleep(session) = &samples[0] else {
            panic!("expected sleep sample");
        };
        assert_eq!(session.quality, 88);
        assert_eq!(session.stages.len(), 4);
        // 240 light + 90 deep + 100 rem, awake excluded
        assert_eq!(session.duration_minutes, 430);
    }

    #[test]
    fn unscored_cycles_yield_no_heart_rate_samples() {
        let raw = json!({"records": [{"start": "2025-06-01T04:00:00.000Z"}]});
        let samples = WhoopProvider::new()
            .transform(&raw, DataFamily::HeartRate)
            .unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn recovery_records_take_precedence() {
        let raw = json!({
            "records": [{
                "created_at": "2025-06-02T06:30:00.000Z",
                "score": {"recovery_score": 71.0, "resting_heart_rate": 52.0, "hrv_rmssd_milli": 64.0}
            }]
        });
        let samples = WhoopProvider::new()
            .transform(&raw, DataFamily::Recovery)
            .unwrap();
        let CanonicalSample::Recovery(score) = &samples[0] else {
            panic!("expected recovery sample");
        };
        assert_eq!(score.recovery_score, 71);
        assert_eq!(score.resting_heart_rate, Some(52));
    }
}
