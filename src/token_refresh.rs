// ABOUTME: Lazy OAuth token refresh with per-device single-flight serialization
// ABOUTME: Invoked before every fetch cycle; never issues two concurrent refreshes for one device
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use crate::errors::{ProviderError, ProviderResult};
use crate::models::DeviceConnection;
use crate::providers::registry::ProviderRegistry;
use crate::registry::ConnectionRegistry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// What a refresh check decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Token was still inside its validity window; nothing was exchanged
    StillValid,
    /// A refresh exchange ran and the registry now holds new tokens
    Refreshed,
}

/// Per-provider token refresh with at-most-once semantics per fetch cycle.
///
/// Refreshes for the same device are serialized through a per-device lock;
/// a second caller that was queued behind a refresh re-checks expiry under
/// the lock and becomes a no-op instead of a duplicate exchange.
pub struct TokenRefreshManager {
    registry: Arc<ConnectionRegistry>,
    providers: Arc<ProviderRegistry>,
    skew_secs: i64,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl TokenRefreshManager {
    /// Manager refreshing tokens `skew_secs` before nominal expiry
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        providers: Arc<ProviderRegistry>,
        skew_secs: i64,
    ) -> Self {
        Self {
            registry,
            providers,
            skew_secs,
            inflight: DashMap::new(),
        }
    }

    fn lock_for(&self, device_id: &str) -> Arc<Mutex<()>> {
        self.inflight
            .entry(device_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Refresh a connection's tokens if they are expired or inside the skew.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NoRefreshToken`] when the token is expired and no
    /// refresh token exists; [`ProviderError::ReauthRequired`] when the
    /// provider rejects the refresh token. Both are terminal for automatic
    /// retry loops.
    #[instrument(skip(self))]
    pub async fn refresh_if_needed(&self, device_id: &str) -> ProviderResult<RefreshOutcome> {
        let connection = self.registry.get(device_id).await.ok_or_else(|| {
            ProviderError::DeviceNotFound {
                device_id: device_id.to_owned(),
            }
        })?;

        if !connection.token_expired(self.skew_secs) {
            return Ok(RefreshOutcome::StillValid);
        }

        let lock = self.lock_for(device_id);
        let _guard = lock.lock().await;

        // Re-check under the lock: a queued caller must not repeat a refresh
        // that just completed.
        let connection = self.registry.get(device_id).await.ok_or_else(|| {
            ProviderError::DeviceNotFound {
                device_id: device_id.to_owned(),
            }
        })?;
        if !connection.token_expired(self.skew_secs) {
            return Ok(RefreshOutcome::StillValid);
        }

        self.exchange_and_store(&connection).await?;
        Ok(RefreshOutcome::Refreshed)
    }

    /// Refresh unconditionally, still serialized per device. Used by the
    /// refresh-then-retry path after a provider rejects an access token and
    /// by reconnection attempts.
    ///
    /// # Errors
    ///
    /// Same terminal errors as [`TokenRefreshManager::refresh_if_needed`].
    #[instrument(skip(self))]
    pub async fn force_refresh(&self, device_id: &str) -> ProviderResult<()> {
        let lock = self.lock_for(device_id);
        let _guard = lock.lock().await;

        let connection = self.registry.get(device_id).await.ok_or_else(|| {
            ProviderError::DeviceNotFound {
                device_id: device_id.to_owned(),
            }
        })?;

        self.exchange_and_store(&connection).await
    }

    /// Drop the lock entry for a removed device
    pub fn forget(&self, device_id: &str) {
        self.inflight.remove(device_id);
    }

    async fn exchange_and_store(&self, connection: &DeviceConnection) -> ProviderResult<()> {
        let refresh_token = connection.refresh_token.as_deref().ok_or_else(|| {
            ProviderError::NoRefreshToken {
                device_id: connection.device_id.clone(),
            }
        })?;

        let adapter = self.providers.get(connection.device_type).ok_or_else(|| {
            ProviderError::UnsupportedDevice {
                device_type: connection.device_type.to_string(),
            }
        })?;

        let tokens = adapter
            .exchange_refresh_token(refresh_token)
            .await
            .map_err(|e| {
                warn!(
                    device_id = %connection.device_id,
                    provider = %connection.device_type,
                    error = %e,
                    "token refresh failed"
                );
                e
            })?;

        let expires_at = tokens.expires_at;
        self.registry
            .update_tokens(
                &connection.device_id,
                tokens.access_token,
                tokens.refresh_token,
                expires_at,
            )
            .await;

        info!(
            device_id = %connection.device_id,
            provider = %connection.device_type,
            %expires_at,
            "access token refreshed"
        );
        Ok(())
    }
}
