// ABOUTME: Canonical biometric sample families for cross-provider normalization
// ABOUTME: Heart rate, HRV, sleep, activity, and recovery shapes with neutral defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The five logical data families every provider exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFamily {
    /// Intraday heart rate samples
    HeartRate,
    /// Heart rate variability samples
    Hrv,
    /// Sleep sessions with stage breakdowns
    Sleep,
    /// Daily activity summaries
    Activity,
    /// Daily recovery / readiness scores
    Recovery,
}

impl DataFamily {
    /// All families, in fetch fan-out order
    pub const ALL: [Self; 5] = [
        Self::HeartRate,
        Self::Hrv,
        Self::Sleep,
        Self::Activity,
        Self::Recovery,
    ];

    /// Stable lowercase name used in logs and error messages
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HeartRate => "heart_rate",
            Self::Hrv => "hrv",
            Self::Sleep => "sleep",
            Self::Activity => "activity",
            Self::Recovery => "recovery",
        }
    }
}

impl fmt::Display for DataFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One intraday heart rate reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartRateSample {
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Beats per minute
    pub bpm: u32,
    /// Provider-reported heart rate zone, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

/// One heart rate variability reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrvSample {
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Primary HRV value in milliseconds (provider's headline metric)
    pub hrv_ms: f64,
    /// Root mean square of successive differences, when reported separately
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmssd: Option<f64>,
    /// Standard deviation of NN intervals, when reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdnn: Option<f64>,
}

/// Sleep stage classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStageKind {
    /// Awake during the session
    Awake,
    /// Light sleep
    Light,
    /// Deep (slow wave) sleep
    Deep,
    /// REM sleep
    Rem,
}

/// One stage within a sleep session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepStage {
    /// Stage classification
    pub stage: SleepStageKind,
    /// When the stage began
    pub start: DateTime<Utc>,
    /// Stage duration in minutes
    pub duration_minutes: u32,
}

/// One night (or nap) of sleep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepSession {
    /// When sleep began
    pub start: DateTime<Utc>,
    /// When sleep ended
    pub end: DateTime<Utc>,
    /// Total sleep duration in minutes
    pub duration_minutes: u32,
    /// Ordered stage breakdown
    pub stages: Vec<SleepStage>,
    /// Provider quality score, 0-100; 0 when the provider reports none
    pub quality: u8,
    /// Sleep efficiency percentage, 0-100; 0 when the provider reports none
    pub efficiency: f32,
}

/// Daily activity summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySummary {
    /// Calendar day the summary covers
    pub date: NaiveDate,
    /// Step count
    pub steps: u64,
    /// Distance covered in kilometers
    pub distance_km: f64,
    /// Calories burned
    pub calories: u32,
    /// Minutes of moderate-or-better activity
    pub active_minutes: u32,
}

/// Direction of a recovery trend relative to baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTrend {
    /// Recovery trending up
    Improving,
    /// Recovery holding steady
    Stable,
    /// Recovery trending down
    Declining,
}

/// Daily recovery / readiness score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryScore {
    /// Calendar day the score covers
    pub date: NaiveDate,
    /// Overall recovery score, 0-100; 0 when the provider reports none
    pub recovery_score: u8,
    /// HRV contribution to the score
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hrv_score: Option<f32>,
    /// Resting heart rate for the day
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resting_heart_rate: Option<u32>,
    /// Sleep performance contribution, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_performance: Option<f32>,
    /// Strain accumulated the previous day
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strain_yesterday: Option<f32>,
    /// Deviation from the wearer's baseline, in provider units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_deviation: Option<f32>,
    /// Trend direction relative to baseline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<RecoveryTrend>,
}

/// Heterogeneous canonical sample, tagged by family for persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanonicalSample {
    /// Heart rate reading
    HeartRate(HeartRateSample),
    /// HRV reading
    Hrv(HrvSample),
    /// Sleep session
    Sleep(SleepSession),
    /// Daily activity summary
    Activity(ActivitySummary),
    /// Daily recovery score
    Recovery(RecoveryScore),
}

impl CanonicalSample {
    /// The data family this sample belongs to
    #[must_use]
    pub const fn family(&self) -> DataFamily {
        match self {
            Self::HeartRate(_) => DataFamily::HeartRate,
            Self::Hrv(_) => DataFamily::Hrv,
            Self::Sleep(_) => DataFamily::Sleep,
            Self::Activity(_) => DataFamily::Activity,
            Self::Recovery(_) => DataFamily::Recovery,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_order_is_stable() {
        assert_eq!(DataFamily::ALL.len(), 5);
        assert_eq!(DataFamily::ALL[0], DataFamily::HeartRate);
        assert_eq!(DataFamily::Sleep.as_str(), "sleep");
    }

    #[test]
    fn canonical_sample_reports_its_family() {
        let sample = CanonicalSample::Activity(ActivitySummary {
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            steps: 9_000,
            distance_km: 6.4,
            calories: 2_100,
            active_minutes: 42,
        });
        assert_eq!(sample.family(), DataFamily::Activity);
    }
}
