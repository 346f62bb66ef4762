// ABOUTME: Caller-facing service facade wiring registry, orchestrator, monitor, and scheduler
// ABOUTME: The only API surface the surrounding application consumes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use crate::config::ServiceConfig;
use crate::errors::{ProviderError, ProviderResult};
use crate::health::HealthMonitor;
use crate::models::{ConnectionHealth, DeviceConnection, DeviceType, SyncResult};
use crate::providers::registry::ProviderRegistry;
use crate::rate_limiting::ProviderRateLimiter;
use crate::registry::ConnectionRegistry;
use crate::scheduler::SyncScheduler;
use crate::storage::SampleStore;
use crate::sync::SyncOrchestrator;
use crate::token_refresh::TokenRefreshManager;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Input for registering a new device connection
#[derive(Debug, Clone)]
pub struct RegisterDeviceInput {
    /// Unique device identifier
    pub device_id: String,
    /// Owning user
    pub user_id: Uuid,
    /// Wearable brand
    pub device_type: DeviceType,
    /// Access token obtained from the provider's consent flow
    pub access_token: String,
    /// Refresh token, when the provider issued one
    pub refresh_token: Option<String>,
    /// Access token expiry
    pub token_expiry: DateTime<Utc>,
    /// Sync cadence override; the engine default applies when `None`
    pub sync_frequency_minutes: Option<u32>,
}

/// The wearable synchronization engine.
///
/// Wires every component together and exposes the caller-facing API:
/// registration, one-shot and batch sync, health queries, forced
/// reconnection, and removal.
pub struct WearsyncService {
    registry: Arc<ConnectionRegistry>,
    providers: Arc<ProviderRegistry>,
    orchestrator: Arc<SyncOrchestrator>,
    monitor: Arc<HealthMonitor>,
    refresh: Arc<TokenRefreshManager>,
    scheduler: Arc<SyncScheduler>,
    config: ServiceConfig,
}

impl WearsyncService {
    /// Service with environment configuration and all built-in providers
    #[must_use]
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self::with_parts(ServiceConfig::from_env(), ProviderRegistry::new(), store)
    }

    /// Service with explicit configuration and provider registry.
    ///
    /// This is the wiring point tests use to install mock adapters.
    #[must_use]
    pub fn with_parts(
        config: ServiceConfig,
        providers: ProviderRegistry,
        store: Arc<dyn SampleStore>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let providers = Arc::new(providers);
        let refresh = Arc::new(TokenRefreshManager::new(
            Arc::clone(&registry),
            Arc::clone(&providers),
            config.token_expiry_skew_secs,
        ));
        let limiter = Arc::new(ProviderRateLimiter::new(config.rate_limit_max_wait));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&providers),
            Arc::clone(&refresh),
            store,
            limiter,
            config.clone(),
        ));
        let monitor = Arc::new(HealthMonitor::new(config.backoff.clone()));
        let scheduler = Arc::new(SyncScheduler::new(
            Arc::clone(&orchestrator),
            Arc::clone(&monitor),
            Arc::clone(&refresh),
            Arc::clone(&registry),
            Arc::clone(&providers),
            config.clone(),
        ));

        Self {
            registry,
            providers,
            orchestrator,
            monitor,
            refresh,
            scheduler,
            config,
        }
    }

    /// Start scheduled syncing and health probing
    pub async fn start(&self) {
        self.scheduler.start().await;
    }

    /// Drain in-flight work and stop all scheduled tasks
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// Register a device connection and begin scheduling it.
    ///
    /// Returns `false` when the device id is already registered and active.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Configuration`] when no adapter is registered for the
    /// device type. This is the only time an unsupported type surfaces; sync
    /// paths never see one.
    #[instrument(skip(self, input), fields(device_id = %input.device_id, device_type = %input.device_type))]
    pub async fn register_device(&self, input: RegisterDeviceInput) -> ProviderResult<bool> {
        if !self.providers.is_supported(input.device_type) {
            return Err(ProviderError::Configuration {
                provider: input.device_type.to_string(),
                details: "no adapter registered for this device type".to_owned(),
            });
        }

        let connection = DeviceConnection {
            device_id: input.device_id.clone(),
            user_id: input.user_id,
            device_type: input.device_type,
            access_token: input.access_token,
            refresh_token: input.refresh_token,
            token_expiry: input.token_expiry,
            last_sync: DateTime::<Utc>::UNIX_EPOCH,
            sync_frequency_minutes: input
                .sync_frequency_minutes
                .unwrap_or(self.config.default_sync_frequency_minutes),
            is_active: true,
        };

        let inserted = self.registry.register(connection).await;
        if inserted {
            self.monitor.track(&input.device_id);
            self.scheduler.watch_device(&input.device_id);
        }
        Ok(inserted)
    }

    /// Synchronize one device now and feed the outcome into health tracking
    pub async fn sync_device(&self, device_id: &str) -> SyncResult {
        let result = self.orchestrator.sync_device(device_id).await;
        let verdict = self.monitor.observe(&result);
        self.scheduler.handle_verdict(device_id, verdict);
        result
    }

    /// Synchronize every active device, with courtesy spacing between them
    pub async fn sync_all_devices(&self) -> Vec<SyncResult> {
        let shutdown = self.scheduler.shutdown_signal();
        let results = self
            .orchestrator
            .sync_all_with_shutdown(Some(&shutdown))
            .await;
        for result in &results {
            let verdict = self.monitor.observe(result);
            self.scheduler.handle_verdict(&result.device_id, verdict);
        }
        results
    }

    /// Health snapshot for one device
    #[must_use]
    pub fn get_connection_health(&self, device_id: &str) -> Option<ConnectionHealth> {
        self.monitor.get(device_id)
    }

    /// Every connection currently judged unhealthy
    #[must_use]
    pub fn get_unhealthy_connections(&self) -> Vec<ConnectionHealth> {
        self.monitor.unhealthy()
    }

    /// One user's active connections
    pub async fn devices_for_user(&self, user_id: Uuid) -> Vec<DeviceConnection> {
        self.registry.list_active_by_user(user_id).await
    }

    /// Explicit user-driven reconnection. Bypasses the automatic attempt cap:
    /// the attempt is not recorded against the backoff window.
    #[instrument(skip(self))]
    pub async fn force_reconnect(&self, device_id: &str) -> bool {
        if let Err(e) = self.refresh.refresh_if_needed(device_id).await {
            warn!(device_id, error = %e, "forced reconnect refresh failed");
            let verdict = self.monitor.observe_probe(device_id, Some(&e));
            self.scheduler.handle_verdict(device_id, verdict);
            return false;
        }

        let result = self.orchestrator.sync_device(device_id).await;
        let verdict = self.monitor.observe(&result);
        self.scheduler.handle_verdict(device_id, verdict);
        result.success
    }

    /// Deactivate a device, stop all its scheduled work, and best-effort
    /// revoke its tokens at the provider. The registration itself is soft-
    /// deleted, never removed, so history stays referentially intact.
    #[instrument(skip(self))]
    pub async fn remove_device(&self, device_id: &str) -> bool {
        let Some(connection) = self.registry.get(device_id).await else {
            return false;
        };

        self.scheduler.unwatch_device(device_id);
        let deactivated = self.registry.deactivate(device_id).await;

        if let Some(adapter) = self.providers.get(connection.device_type) {
            if let Err(e) = adapter.revoke(&connection).await {
                warn!(device_id, error = %e, "token revocation failed; continuing removal");
            }
        }

        self.monitor.forget(device_id);
        self.refresh.forget(device_id);
        self.orchestrator.forget(device_id);

        info!(device_id, "device removed");
        deactivated
    }
}
