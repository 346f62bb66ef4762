// ABOUTME: Connection registry owning every registered device connection
// ABOUTME: Narrow, lock-guarded mutators keep the locking discipline centralized
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use crate::models::DeviceConnection;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Owner of all [`DeviceConnection`] mutable state.
///
/// The connection map is the only truly shared mutable state in the engine;
/// every access goes through these narrow methods. No component ever holds a
/// reference into the map, so token updates and `last_sync` advances cannot
/// race each other into lost writes.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, DeviceConnection>>,
}

impl ConnectionRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new connection, with `last_sync` forced to the never-synced
    /// sentinel. Fails only when the device id already exists and is active;
    /// re-registering over a deactivated connection is allowed.
    pub async fn register(&self, mut connection: DeviceConnection) -> bool {
        let mut connections = self.connections.write().await;
        if connections
            .get(&connection.device_id)
            .is_some_and(|existing| existing.is_active)
        {
            debug!(device_id = %connection.device_id, "registration rejected: already active");
            return false;
        }

        connection.last_sync = DateTime::<Utc>::UNIX_EPOCH;
        connection.is_active = true;
        info!(
            device_id = %connection.device_id,
            device_type = %connection.device_type,
            "device connection registered"
        );
        connections.insert(connection.device_id.clone(), connection);
        true
    }

    /// Snapshot of one connection
    pub async fn get(&self, device_id: &str) -> Option<DeviceConnection> {
        self.connections.read().await.get(device_id).cloned()
    }

    /// Snapshot of all active connections
    pub async fn list_active(&self) -> Vec<DeviceConnection> {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect()
    }

    /// Snapshot of one user's active connections
    pub async fn list_active_by_user(&self, user_id: Uuid) -> Vec<DeviceConnection> {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.is_active && c.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Soft-delete a connection. Idempotent; returns whether the device id
    /// was known. Registrations are never hard-deleted while history may
    /// reference them.
    pub async fn deactivate(&self, device_id: &str) -> bool {
        let mut connections = self.connections.write().await;
        connections.get_mut(device_id).is_some_and(|connection| {
            if connection.is_active {
                info!(device_id, "device connection deactivated");
            }
            connection.is_active = false;
            true
        })
    }

    /// Replace a connection's token fields after a refresh exchange.
    ///
    /// A `None` refresh token keeps the existing one (providers that do not
    /// rotate refresh tokens omit the field from the refresh response).
    pub async fn update_tokens(
        &self,
        device_id: &str,
        access_token: String,
        refresh_token: Option<String>,
        expiry: DateTime<Utc>,
    ) -> bool {
        let mut connections = self.connections.write().await;
        connections.get_mut(device_id).is_some_and(|connection| {
            connection.access_token = access_token;
            if refresh_token.is_some() {
                connection.refresh_token = refresh_token;
            }
            connection.token_expiry = expiry;
            true
        })
    }

    /// Advance a connection's `last_sync` watermark
    pub async fn update_last_sync(&self, device_id: &str, timestamp: DateTime<Utc>) -> bool {
        let mut connections = self.connections.write().await;
        connections.get_mut(device_id).is_some_and(|connection| {
            connection.last_sync = timestamp;
            true
        })
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
