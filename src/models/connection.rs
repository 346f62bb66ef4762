// ABOUTME: Device connection records, sync outcome values, and derived connection health
// ABOUTME: One DeviceConnection per (user, device) pairing with credentials and sync cadence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use crate::constants::provider_names;
use crate::models::DataFamily;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The wearable brands this engine can synchronize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Apple Watch, reached through the companion-app bridge service
    AppleWatch,
    /// WHOOP strap
    Whoop,
    /// Garmin watches
    Garmin,
    /// Fitbit trackers
    Fitbit,
    /// Samsung Galaxy Watch, reached through the companion-app bridge service
    Samsung,
    /// Oura ring
    Oura,
    /// Polar watches
    Polar,
}

impl DeviceType {
    /// All supported device types
    pub const ALL: [Self; 7] = [
        Self::AppleWatch,
        Self::Whoop,
        Self::Garmin,
        Self::Fitbit,
        Self::Samsung,
        Self::Oura,
        Self::Polar,
    ];

    /// Stable lowercase provider name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppleWatch => provider_names::APPLE_WATCH,
            Self::Whoop => provider_names::WHOOP,
            Self::Garmin => provider_names::GARMIN,
            Self::Fitbit => provider_names::FITBIT,
            Self::Samsung => provider_names::SAMSUNG,
            Self::Oura => provider_names::OURA,
            Self::Polar => provider_names::POLAR,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            provider_names::APPLE_WATCH => Ok(Self::AppleWatch),
            provider_names::WHOOP => Ok(Self::Whoop),
            provider_names::GARMIN => Ok(Self::Garmin),
            provider_names::FITBIT => Ok(Self::Fitbit),
            provider_names::SAMSUNG => Ok(Self::Samsung),
            provider_names::OURA => Ok(Self::Oura),
            provider_names::POLAR => Ok(Self::Polar),
            other => Err(format!("unknown device type: {other}")),
        }
    }
}

/// One registered (user, device) pairing with credentials and sync cadence.
///
/// Owned exclusively by the [`crate::registry::ConnectionRegistry`]; token
/// fields are mutated through `update_tokens` and `last_sync` through
/// `update_last_sync` only, so concurrent syncs cannot lose updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConnection {
    /// Unique device identifier
    pub device_id: String,
    /// Owning user
    pub user_id: Uuid,
    /// Wearable brand
    pub device_type: DeviceType,
    /// Current access token
    pub access_token: String,
    /// Refresh token, when the provider issued one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub token_expiry: DateTime<Utc>,
    /// Last successful sync; the Unix epoch means "never synced"
    pub last_sync: DateTime<Utc>,
    /// Sync cadence in minutes
    pub sync_frequency_minutes: u32,
    /// Inactive connections are never scheduled for sync or health checks
    pub is_active: bool,
}

impl DeviceConnection {
    /// Whether this connection has ever completed a sync
    #[must_use]
    pub fn never_synced(&self) -> bool {
        self.last_sync == DateTime::<Utc>::UNIX_EPOCH
    }

    /// Whether the access token is expired or inside the safety skew
    #[must_use]
    pub fn token_expired(&self, skew_secs: i64) -> bool {
        self.token_expiry <= Utc::now() + Duration::seconds(skew_secs)
    }

    /// When the next scheduled sync is due
    #[must_use]
    pub fn next_sync_due(&self) -> DateTime<Utc> {
        self.last_sync + Duration::minutes(i64::from(self.sync_frequency_minutes))
    }
}

/// Outcome of one sync attempt, consumed by the health monitor.
///
/// A partial sync (some families failed) still reports `success: true`; the
/// failed family names appear in `errors`. `success: false` is reserved for
/// connection-level failure (auth, missing device, persistence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// Device that was synced
    pub device_id: String,
    /// Whether the sync succeeded at the connection level
    pub success: bool,
    /// Total canonical samples produced across succeeded families
    pub data_point_count: usize,
    /// Per-family sample counts for the families that succeeded
    pub families: BTreeMap<DataFamily, usize>,
    /// Errors recorded during the attempt, family-level and connection-level
    pub errors: Vec<String>,
    /// `last_sync` value after this attempt
    pub last_sync: DateTime<Utc>,
    /// When the next sync is due; always advanced, even on failure
    pub next_sync: DateTime<Utc>,
    /// Wall-clock duration of the attempt in milliseconds
    pub duration_ms: u64,
    /// True when a failure was caused solely by provider rate limiting.
    /// Health accounting must not count such a cycle as a broken connection.
    pub rate_limited: bool,
}

/// Derived liveness and reliability state of a connection.
///
/// Distinct from any single sync outcome: one failed fetch does not make a
/// connection unhealthy, and one rate-limited cycle never will.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionHealth {
    /// Device this health record describes
    pub device_id: String,
    /// Flips false once consecutive failures reach the threshold
    pub is_healthy: bool,
    /// Most recent successful sync, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_successful_sync: Option<DateTime<Utc>>,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Rolling mean sync duration in milliseconds
    pub average_response_time_ms: f64,
    /// Most recent error message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Set once the automatic reconnection budget is exhausted
    pub requires_manual_reconnect: bool,
}

impl ConnectionHealth {
    /// Fresh health record for a newly registered connection
    #[must_use]
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_owned(),
            is_healthy: true,
            last_successful_sync: None,
            consecutive_failures: 0,
            average_response_time_ms: 0.0,
            last_error: None,
            requires_manual_reconnect: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(expiry_offset_secs: i64) -> DeviceConnection {
        DeviceConnection {
            device_id: "dev-1".to_owned(),
            user_id: Uuid::new_v4(),
            device_type: DeviceType::Fitbit,
            access_token: "token".to_owned(),
            refresh_token: Some("refresh".to_owned()),
            token_expiry: Utc::now() + Duration::seconds(expiry_offset_secs),
            last_sync: DateTime::<Utc>::UNIX_EPOCH,
            sync_frequency_minutes: 30,
            is_active: true,
        }
    }

    #[test]
    fn epoch_last_sync_means_never_synced() {
        let conn = connection(3_600);
        assert!(conn.never_synced());
    }

    #[test]
    fn token_expiry_honors_skew() {
        // Expires in 30s: fine with no skew, expired under a 60s skew.
        let conn = connection(30);
        assert!(!conn.token_expired(0));
        assert!(conn.token_expired(60));
    }

    #[test]
    fn device_type_round_trips_through_str() {
        for device_type in DeviceType::ALL {
            assert_eq!(
                device_type.as_str().parse::<DeviceType>().ok(),
                Some(device_type)
            );
        }
        assert!("pebble".parse::<DeviceType>().is_err());
    }
}
