// ABOUTME: Wearable device synchronization and connection resilience engine
// ABOUTME: Pulls biometric data from wearable providers into one canonical model and keeps connections alive
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! # Wearsync
//!
//! Synchronization engine for wearable biometric data. The crate pulls heart
//! rate, HRV, sleep, activity, and recovery data from seven wearable providers
//! (Apple Watch, WHOOP, Garmin, Fitbit, Samsung, Oura, Polar), normalizes every
//! payload into one canonical model, and keeps each device connection alive
//! across token expiry, transient API failures, and rate limits.
//!
//! ## Architecture
//!
//! - [`models`] — canonical sample shapes all providers normalize into
//! - [`providers`] — one [`providers::core::WearableProvider`] adapter per device type,
//!   selected through the provider registry
//! - [`registry`] — owns the set of registered device connections
//! - [`token_refresh`] — lazy, single-flight OAuth token refresh per device
//! - [`sync`] — the orchestrator driving one-shot and batch synchronization
//! - [`health`] — connection health tracking and backoff-bounded reconnection
//! - [`scheduler`] — per-connection timers, probe loop, and graceful shutdown
//! - [`service`] — the caller-facing facade wiring everything together

/// Daemon and per-provider configuration loaded from environment variables
pub mod config;
/// System-wide constants and environment defaults
pub mod constants;
/// Structured error taxonomy for provider and sync operations
pub mod errors;
/// Connection health monitoring and reconnection backoff
pub mod health;
/// Logging configuration and tracing subscriber setup
pub mod logging;
/// Canonical data model shared by all providers
pub mod models;
/// Provider adapters and the provider registry
pub mod providers;
/// Per-provider token-bucket rate limiting
pub mod rate_limiting;
/// Device connection registry
pub mod registry;
/// Per-connection sync timers and the health probe loop
pub mod scheduler;
/// Caller-facing service facade
pub mod service;
/// Storage collaborator boundary
pub mod storage;
/// Sync orchestration state machine
pub mod sync;
/// Lazy token refresh with per-device single-flight guarantees
pub mod token_refresh;

pub use config::{BackoffConfig, ServiceConfig};
pub use errors::{ProviderError, ProviderResult};
pub use health::{HealthMonitor, HealthVerdict};
pub use models::{
    CanonicalSample, ConnectionHealth, DataFamily, DeviceConnection, DeviceType, SyncResult,
};
pub use providers::core::WearableProvider;
pub use providers::registry::ProviderRegistry;
pub use registry::ConnectionRegistry;
pub use service::{RegisterDeviceInput, WearsyncService};
pub use storage::{InMemoryStore, SampleStore};
pub use sync::SyncOrchestrator;
