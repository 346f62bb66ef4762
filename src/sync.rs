// ABOUTME: Sync orchestration state machine driving one-shot and batch synchronization
// ABOUTME: Token check, concurrent per-family fan-out, partial-success accounting, persistence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! Sync orchestrator.
//!
//! Each sync attempt walks `Idle -> TokenCheck -> Fetching -> Transforming ->
//! Persisting -> Done`, with any stage dropping to `Failed` on unrecoverable
//! error. A failed attempt still reports a [`SyncResult`] with an advanced
//! `next_sync`, so one failure never drops a device out of scheduling.

use crate::config::ServiceConfig;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::{CanonicalSample, DataFamily, DeviceConnection, SyncResult};
use crate::providers::core::{FetchWindow, WearableProvider};
use crate::providers::registry::ProviderRegistry;
use crate::rate_limiting::ProviderRateLimiter;
use crate::registry::ConnectionRegistry;
use crate::storage::SampleStore;
use crate::token_refresh::TokenRefreshManager;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tracing::{info, instrument, warn};

/// Stages of one sync attempt, used for logging and failure attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    /// Nothing running
    Idle,
    /// Connection lookup and token refresh
    TokenCheck,
    /// Concurrent per-family fetches
    Fetching,
    /// Raw payloads becoming canonical samples
    Transforming,
    /// Handing samples to the storage collaborator
    Persisting,
    /// Attempt finished successfully
    Done,
    /// Attempt finished with a connection-level failure
    Failed,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::TokenCheck => "token_check",
            Self::Fetching => "fetching",
            Self::Transforming => "transforming",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one family's fetch+transform within a sync
type FamilyOutcome = (DataFamily, ProviderResult<Vec<CanonicalSample>>);

/// Drives synchronization for registered connections.
///
/// Operations on a single device are serialized through a per-device lock;
/// syncs for different devices interleave freely.
pub struct SyncOrchestrator {
    registry: Arc<ConnectionRegistry>,
    providers: Arc<ProviderRegistry>,
    refresh: Arc<TokenRefreshManager>,
    store: Arc<dyn SampleStore>,
    limiter: Arc<ProviderRateLimiter>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    config: ServiceConfig,
}

impl SyncOrchestrator {
    /// Wire an orchestrator from its collaborators
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        providers: Arc<ProviderRegistry>,
        refresh: Arc<TokenRefreshManager>,
        store: Arc<dyn SampleStore>,
        limiter: Arc<ProviderRateLimiter>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            registry,
            providers,
            refresh,
            store,
            limiter,
            locks: DashMap::new(),
            config,
        }
    }

    fn lock_for(&self, device_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(device_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Drop the lock entry for a removed device
    pub fn forget(&self, device_id: &str) {
        self.locks.remove(device_id);
    }

    /// Synchronize one device end to end.
    ///
    /// Never returns an error: every failure mode is folded into the
    /// [`SyncResult`] so the health monitor sees a uniform stream.
    #[instrument(skip(self))]
    pub async fn sync_device(&self, device_id: &str) -> SyncResult {
        let started = Instant::now();

        // TokenCheck: fail fast on unknown or inactive connections, before
        // any lock or network traffic.
        let Some(connection) = self.registry.get(device_id).await else {
            return self.not_found_result(device_id, started);
        };
        if !connection.is_active {
            return self.not_found_result(device_id, started);
        }

        let lock = self.lock_for(device_id);
        let _guard = lock.lock().await;

        self.sync_locked(device_id, started).await
    }

    /// The body of a sync, run with the device lock held
    async fn sync_locked(&self, device_id: &str, started: Instant) -> SyncResult {
        let now = Utc::now();

        if let Err(e) = self.refresh.refresh_if_needed(device_id).await {
            return self.failed_result(device_id, started, vec![e.to_string()], false).await;
        }

        // Re-read for the freshly refreshed token; the connection may also
        // have been deactivated while we waited on the lock.
        let Some(connection) = self.registry.get(device_id).await else {
            return self.not_found_result(device_id, started);
        };
        if !connection.is_active {
            return self.not_found_result(device_id, started);
        }

        let Some(adapter) = self.providers.get(connection.device_type) else {
            let err = ProviderError::UnsupportedDevice {
                device_type: connection.device_type.to_string(),
            };
            return self
                .failed_result(device_id, started, vec![err.to_string()], false)
                .await;
        };

        let window = FetchWindow {
            since: if connection.never_synced() {
                now - ChronoDuration::days(self.config.initial_backfill_days)
            } else {
                connection.last_sync
            },
            until: now,
        };

        // Fetching + Transforming: all five families fan out concurrently;
        // one family failing never aborts the others.
        let mut outcomes = self
            .fetch_families(&adapter, &connection, &window, &DataFamily::ALL)
            .await;

        // A rejected access token gets exactly one refresh-then-retry cycle.
        let rejected: Vec<DataFamily> = outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, Err(ProviderError::TokenRejected { .. })))
            .map(|(family, _)| *family)
            .collect();
        if !rejected.is_empty() {
            match self.refresh.force_refresh(device_id).await {
                Ok(()) => {
                    if let Some(fresh) = self.registry.get(device_id).await {
                        let retried = self
                            .fetch_families(&adapter, &fresh, &window, &rejected)
                            .await;
                        for (family, outcome) in retried {
                            if let Some(slot) =
                                outcomes.iter_mut().find(|(f, _)| *f == family)
                            {
                                slot.1 = outcome;
                            }
                        }
                    }
                }
                Err(e) => {
                    return self
                        .failed_result(device_id, started, vec![e.to_string()], false)
                        .await;
                }
            }
        }

        self.settle(&connection, outcomes, now, started).await
    }

    /// Fold family outcomes into a result, persisting what succeeded
    async fn settle(
        &self,
        connection: &DeviceConnection,
        outcomes: Vec<FamilyOutcome>,
        now: DateTime<Utc>,
        started: Instant,
    ) -> SyncResult {
        let device_id = &connection.device_id;
        let mut families = BTreeMap::new();
        let mut errors = Vec::new();
        let mut collected: Vec<(DataFamily, Vec<CanonicalSample>)> = Vec::new();
        let mut failed_families = 0u32;
        let mut rate_limited_failures = 0u32;

        for (family, outcome) in outcomes {
            match outcome {
                Ok(samples) => {
                    families.insert(family, samples.len());
                    collected.push((family, samples));
                }
                Err(e) => {
                    failed_families += 1;
                    if matches!(e, ProviderError::RateLimited { .. }) {
                        rate_limited_failures += 1;
                    }
                    warn!(%device_id, %family, error = %e, "data family failed");
                    errors.push(format!("{family}: {e}"));
                }
            }
        }

        // Total failure: nothing fetched at all. Rate limiting alone must not
        // read as a broken connection.
        if collected.is_empty() {
            let rate_limited = failed_families > 0 && failed_families == rate_limited_failures;
            return self
                .failed_result(device_id, started, errors, rate_limited)
                .await;
        }

        // Persisting: per family, so one failed family cannot block the rest
        let mut persist_failed = false;
        for (family, samples) in &collected {
            if samples.is_empty() {
                continue;
            }
            if let Err(e) = self
                .store
                .persist(device_id, connection.user_id, samples)
                .await
            {
                persist_failed = true;
                warn!(%device_id, %family, error = %e, "persist failed");
                errors.push(format!("{family}: {e}"));
            }
        }

        let data_point_count: usize = families.values().sum();
        let success = !persist_failed;
        let (stage, last_sync) = if success {
            self.registry.update_last_sync(device_id, now).await;
            (SyncStage::Done, now)
        } else {
            (SyncStage::Failed, connection.last_sync)
        };

        info!(
            %device_id,
            %stage,
            data_point_count,
            failed_families,
            duration_ms = started.elapsed().as_millis() as u64,
            "sync finished"
        );

        SyncResult {
            device_id: device_id.clone(),
            success,
            data_point_count,
            families,
            errors,
            last_sync,
            next_sync: now + ChronoDuration::minutes(i64::from(connection.sync_frequency_minutes)),
            duration_ms: started.elapsed().as_millis() as u64,
            rate_limited: false,
        }
    }

    /// Fan out fetch+transform for the given families, each bounded by the
    /// sync timeout; unfinished families become timeouts.
    async fn fetch_families(
        &self,
        adapter: &Arc<dyn WearableProvider>,
        connection: &DeviceConnection,
        window: &FetchWindow,
        families: &[DataFamily],
    ) -> Vec<FamilyOutcome> {
        let timeout = self.config.sync_timeout;
        let futures = families.iter().map(|&family| {
            let adapter = Arc::clone(adapter);
            let connection = connection.clone();
            let window = *window;
            let limiter = Arc::clone(&self.limiter);
            async move {
                let attempt = tokio::time::timeout(timeout, async {
                    limiter
                        .acquire(connection.device_type, adapter.config().rate_limit)
                        .await?;
                    let raw = adapter.fetch(&connection, family, &window).await?;
                    adapter.transform(&raw, family)
                })
                .await;

                let outcome = attempt.unwrap_or(Err(ProviderError::Timeout {
                    family,
                    timeout_secs: timeout.as_secs(),
                }));
                (family, outcome)
            }
        });
        join_all(futures).await
    }

    /// Synchronize every active connection, with courtesy spacing between
    /// devices to avoid bursting shared infrastructure.
    pub async fn sync_all(&self) -> Vec<SyncResult> {
        self.sync_all_with_shutdown(None).await
    }

    /// [`SyncOrchestrator::sync_all`] with cooperative cancellation: a raised
    /// shutdown signal stops the batch between devices.
    pub async fn sync_all_with_shutdown(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Vec<SyncResult> {
        let connections = self.registry.list_active().await;
        let mut results = Vec::with_capacity(connections.len());

        for (i, connection) in connections.iter().enumerate() {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                info!(completed = results.len(), "sync_all cancelled by shutdown");
                break;
            }
            if i > 0 {
                tokio::time::sleep(self.config.courtesy_spacing).await;
            }
            results.push(self.sync_device(&connection.device_id).await);
        }
        results
    }

    fn not_found_result(&self, device_id: &str, started: Instant) -> SyncResult {
        let now = Utc::now();
        SyncResult {
            device_id: device_id.to_owned(),
            success: false,
            data_point_count: 0,
            families: BTreeMap::new(),
            errors: vec![format!("Device not found or inactive: {device_id}")],
            last_sync: DateTime::<Utc>::UNIX_EPOCH,
            next_sync: now
                + ChronoDuration::minutes(i64::from(self.config.default_sync_frequency_minutes)),
            duration_ms: started.elapsed().as_millis() as u64,
            rate_limited: false,
        }
    }

    async fn failed_result(
        &self,
        device_id: &str,
        started: Instant,
        errors: Vec<String>,
        rate_limited: bool,
    ) -> SyncResult {
        let now = Utc::now();
        let connection = self.registry.get(device_id).await;
        let (last_sync, frequency) = connection.map_or(
            (
                DateTime::<Utc>::UNIX_EPOCH,
                self.config.default_sync_frequency_minutes,
            ),
            |c| (c.last_sync, c.sync_frequency_minutes),
        );

        warn!(device_id, ?errors, "sync failed");
        SyncResult {
            device_id: device_id.to_owned(),
            success: false,
            data_point_count: 0,
            families: BTreeMap::new(),
            errors,
            last_sync,
            next_sync: now + ChronoDuration::minutes(i64::from(frequency)),
            duration_ms: started.elapsed().as_millis() as u64,
            rate_limited,
        }
    }
}
