// ABOUTME: Canonical data model shared by every provider adapter
// ABOUTME: Connection records, sample families, sync results, and connection health
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! Canonical model all providers normalize into.
//!
//! Provider-specific payload shapes never leak past the adapter boundary;
//! everything downstream of [`crate::providers`] speaks these types.

/// Device connection records, sync results, and connection health
pub mod connection;
/// Biometric sample families
pub mod samples;

pub use connection::{ConnectionHealth, DeviceConnection, DeviceType, SyncResult};
pub use samples::{
    ActivitySummary, CanonicalSample, DataFamily, HeartRateSample, HrvSample, RecoveryScore,
    RecoveryTrend, SleepSession, SleepStage, SleepStageKind,
};
