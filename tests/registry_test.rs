// ABOUTME: Tests for the connection registry's narrow mutators and soft-delete semantics
// ABOUTME: Registration rules, per-field updates, and active-connection listings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors
#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::connection;
use wearsync::models::DeviceType;
use wearsync::registry::ConnectionRegistry;

#[tokio::test]
async fn registration_forces_the_never_synced_sentinel() {
    let registry = ConnectionRegistry::new();
    let mut conn = connection("dev-1", DeviceType::Fitbit);
    conn.last_sync = Utc::now();

    assert!(registry.register(conn).await);
    let stored = registry.get("dev-1").await.unwrap();
    assert!(stored.never_synced());
    assert!(stored.is_active);
}

#[tokio::test]
async fn duplicate_active_registration_is_rejected() {
    let registry = ConnectionRegistry::new();
    assert!(registry.register(connection("dev-1", DeviceType::Oura)).await);
    assert!(!registry.register(connection("dev-1", DeviceType::Oura)).await);
}

#[tokio::test]
async fn reregistration_over_a_deactivated_connection_is_allowed() {
    let registry = ConnectionRegistry::new();
    assert!(registry.register(connection("dev-1", DeviceType::Whoop)).await);
    assert!(registry.deactivate("dev-1").await);
    // Idempotent
    assert!(registry.deactivate("dev-1").await);
    assert!(registry.register(connection("dev-1", DeviceType::Whoop)).await);
    assert!(registry.get("dev-1").await.unwrap().is_active);
}

#[tokio::test]
async fn deactivating_an_unknown_device_reports_false() {
    let registry = ConnectionRegistry::new();
    assert!(!registry.deactivate("ghost").await);
}

#[tokio::test]
async fn update_tokens_keeps_the_refresh_token_when_not_rotated() {
    let registry = ConnectionRegistry::new();
    registry.register(connection("dev-1", DeviceType::Garmin)).await;

    let expiry = Utc::now() + ChronoDuration::hours(2);
    assert!(
        registry
            .update_tokens("dev-1", "new-access".to_owned(), None, expiry)
            .await
    );

    let stored = registry.get("dev-1").await.unwrap();
    assert_eq!(stored.access_token, "new-access");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));
    assert_eq!(stored.token_expiry, expiry);

    assert!(
        registry
            .update_tokens(
                "dev-1",
                "newer-access".to_owned(),
                Some("rotated".to_owned()),
                expiry
            )
            .await
    );
    let stored = registry.get("dev-1").await.unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some("rotated"));
}

#[tokio::test]
async fn update_last_sync_moves_only_the_watermark() {
    let registry = ConnectionRegistry::new();
    registry.register(connection("dev-1", DeviceType::Polar)).await;

    let at = Utc::now();
    assert!(registry.update_last_sync("dev-1", at).await);
    let stored = registry.get("dev-1").await.unwrap();
    assert_eq!(stored.last_sync, at);
    assert_eq!(stored.access_token, "token");

    assert!(!registry.update_last_sync("ghost", at).await);
}

#[tokio::test]
async fn listings_filter_by_active_flag_and_user() {
    let registry = ConnectionRegistry::new();
    let a = connection("dev-a", DeviceType::Fitbit);
    let user = a.user_id;
    let mut b = connection("dev-b", DeviceType::Oura);
    b.user_id = user;
    let c = connection("dev-c", DeviceType::Whoop);

    registry.register(a).await;
    registry.register(b).await;
    registry.register(c).await;
    registry.deactivate("dev-b").await;

    assert_eq!(registry.list_active().await.len(), 2);
    let for_user = registry.list_active_by_user(user).await;
    assert_eq!(for_user.len(), 1);
    assert_eq!(for_user[0].device_id, "dev-a");
}

#[tokio::test]
async fn next_sync_due_builds_on_last_sync() {
    let registry = ConnectionRegistry::new();
    registry.register(connection("dev-1", DeviceType::Samsung)).await;

    let stored = registry.get("dev-1").await.unwrap();
    assert_eq!(
        stored.next_sync_due(),
        DateTime::<Utc>::UNIX_EPOCH + ChronoDuration::minutes(30)
    );
}
