// ABOUTME: Provider adapters for every supported wearable brand
// ABOUTME: Core adapter trait, shared HTTP plumbing, and the adapter registry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! Provider adapter layer.
//!
//! One [`core::WearableProvider`] implementation per wearable brand, selected
//! through [`registry::ProviderRegistry`]. Adapters know how to authenticate,
//! fetch raw payloads, and transform them into the canonical model; they are
//! stateless beyond their static endpoint and rate-limit configuration.

/// Companion-app bridge adapter (Apple Watch, Samsung Health)
pub mod bridge;
/// Core adapter trait and shared request/response types
pub mod core;
/// Fitbit Web API adapter
pub mod fitbit;
/// Garmin Wellness API adapter
pub mod garmin;
/// Shared HTTP client and provider status-code mapping
pub mod http;
/// Oura API v2 adapter
pub mod oura;
/// Polar AccessLink adapter
pub mod polar;
/// Adapter registry keyed by device type
pub mod registry;
/// WHOOP developer API adapter
pub mod whoop;

pub use core::{
    AuthScheme, FetchWindow, ProviderConfig, RateLimitBudget, RefreshedTokens, WearableProvider,
};
pub use registry::ProviderRegistry;
