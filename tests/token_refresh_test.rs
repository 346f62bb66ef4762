// ABOUTME: Tests for lazy token refresh: skew handling, single-flight, and terminal errors
// ABOUTME: Exercises the manager directly against a connection registry and mock adapters
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors
#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{connection, MockProvider};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use wearsync::errors::ProviderError;
use wearsync::models::DeviceType;
use wearsync::providers::registry::ProviderRegistry;
use wearsync::registry::ConnectionRegistry;
use wearsync::token_refresh::{RefreshOutcome, TokenRefreshManager};

const SKEW_SECS: i64 = 60;

fn manager(adapter: Arc<MockProvider>) -> (Arc<ConnectionRegistry>, Arc<TokenRefreshManager>) {
    let registry = Arc::new(ConnectionRegistry::new());
    let mut providers = ProviderRegistry::empty();
    providers.register(adapter);
    let manager = Arc::new(TokenRefreshManager::new(
        Arc::clone(&registry),
        Arc::new(providers),
        SKEW_SECS,
    ));
    (registry, manager)
}

#[tokio::test]
async fn valid_token_is_a_no_op() {
    let adapter = Arc::new(MockProvider::new(DeviceType::Fitbit));
    let (registry, manager) = manager(Arc::clone(&adapter));
    registry.register(connection("dev-1", DeviceType::Fitbit)).await;

    let outcome = manager.refresh_if_needed("dev-1").await.unwrap();

    assert_eq!(outcome, RefreshOutcome::StillValid);
    assert_eq!(adapter.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn token_inside_the_skew_is_refreshed() {
    let adapter = Arc::new(MockProvider::new(DeviceType::Fitbit));
    let (registry, manager) = manager(Arc::clone(&adapter));
    let mut conn = connection("dev-1", DeviceType::Fitbit);
    // Thirty seconds left: inside the sixty-second skew
    conn.token_expiry = Utc::now() + ChronoDuration::seconds(30);
    registry.register(conn).await;

    let outcome = manager.refresh_if_needed("dev-1").await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Refreshed);
    assert_eq!(adapter.refresh_calls.load(Ordering::SeqCst), 1);

    let refreshed = registry.get("dev-1").await.unwrap();
    assert!(refreshed.access_token.starts_with("refreshed-token"));
    assert_eq!(refreshed.refresh_token.as_deref(), Some("rotated-refresh"));
    assert!(refreshed.token_expiry > Utc::now() + ChronoDuration::minutes(30));
}

#[tokio::test]
async fn missing_refresh_token_is_surfaced_not_retried() {
    let adapter = Arc::new(MockProvider::new(DeviceType::Oura));
    let (registry, manager) = manager(Arc::clone(&adapter));
    let mut conn = connection("dev-1", DeviceType::Oura);
    conn.token_expiry = Utc::now() - ChronoDuration::hours(1);
    conn.refresh_token = None;
    registry.register(conn).await;

    let err = manager.refresh_if_needed("dev-1").await.unwrap_err();

    assert!(matches!(err, ProviderError::NoRefreshToken { .. }));
    assert!(err.requires_user_action());
    assert_eq!(adapter.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_refresh_token_propagates_reauth_required() {
    let adapter = Arc::new(MockProvider::new(DeviceType::Whoop));
    adapter.refresh_fails.store(true, Ordering::SeqCst);
    let (registry, manager) = manager(Arc::clone(&adapter));
    let mut conn = connection("dev-1", DeviceType::Whoop);
    conn.token_expiry = Utc::now() - ChronoDuration::hours(1);
    registry.register(conn).await;

    let err = manager.refresh_if_needed("dev-1").await.unwrap_err();
    assert!(matches!(err, ProviderError::ReauthRequired { .. }));
}

#[tokio::test]
async fn concurrent_refreshes_for_one_device_exchange_once() {
    let adapter = Arc::new(MockProvider::new(DeviceType::Garmin));
    let (registry, manager) = manager(Arc::clone(&adapter));
    let mut conn = connection("dev-1", DeviceType::Garmin);
    conn.token_expiry = Utc::now() - ChronoDuration::hours(1);
    registry.register(conn).await;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.refresh_if_needed("dev-1").await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // The first caller exchanges; everyone queued behind it re-checks under
    // the lock and becomes a no-op.
    assert_eq!(adapter.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_device_fails_with_device_not_found() {
    let adapter = Arc::new(MockProvider::new(DeviceType::Polar));
    let (_registry, manager) = manager(adapter);

    let err = manager.refresh_if_needed("ghost").await.unwrap_err();
    assert!(matches!(err, ProviderError::DeviceNotFound { .. }));
}
