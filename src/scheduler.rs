// ABOUTME: Per-connection sync timers, the liveness probe loop, and reconnection tasks
// ABOUTME: Everything is bound to a shutdown signal; deregistration stops all timers for a device
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! Sync scheduler.
//!
//! Each active connection gets an independent timer task; probe and
//! reconnection work runs alongside, all bounded by one worker-pool
//! semaphore and all subscribed to the shutdown signal. Removing a device
//! is guaranteed to stop its timers: task handles are tracked per device
//! and aborted on deregistration.

use crate::config::ServiceConfig;
use crate::health::{HealthMonitor, HealthVerdict};
use crate::providers::registry::ProviderRegistry;
use crate::registry::ConnectionRegistry;
use crate::sync::SyncOrchestrator;
use crate::token_refresh::TokenRefreshManager;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cheap-to-clone bundle of the collaborators scheduler tasks need
#[derive(Clone)]
struct SchedulerCore {
    orchestrator: Arc<SyncOrchestrator>,
    monitor: Arc<HealthMonitor>,
    refresh: Arc<TokenRefreshManager>,
    registry: Arc<ConnectionRegistry>,
    providers: Arc<ProviderRegistry>,
    semaphore: Arc<Semaphore>,
    reconnects: Arc<DashMap<String, JoinHandle<()>>>,
    shutdown: Arc<watch::Sender<bool>>,
    started: Arc<AtomicBool>,
    config: ServiceConfig,
}

impl SchedulerCore {
    fn shutting_down(&self) -> bool {
        *self.shutdown.subscribe().borrow()
    }

    /// Act on a health verdict: unhealthy connections get a reconnection
    /// task, at most one per device at a time.
    fn handle_verdict(&self, device_id: &str, verdict: HealthVerdict) {
        match verdict {
            HealthVerdict::Healthy | HealthVerdict::Degraded { .. } => {}
            HealthVerdict::ManualReconnectRequired => {
                warn!(device_id, "connection requires manual reconnection");
            }
            HealthVerdict::ScheduleReconnect { delay } => {
                self.spawn_reconnect(device_id.to_owned(), delay);
            }
        }
    }

    fn spawn_reconnect(&self, device_id: String, delay: Duration) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        if self
            .reconnects
            .get(&device_id)
            .is_some_and(|handle| !handle.is_finished())
        {
            debug!(%device_id, "reconnect already scheduled");
            return;
        }

        info!(%device_id, delay_secs = delay.as_secs(), "reconnect scheduled");
        let core = self.clone();
        let key = device_id.clone();
        let handle = tokio::spawn(async move {
            reconnect_loop(core, device_id, delay).await;
        });
        self.reconnects.insert(key, handle);
    }
}

/// One reconnection campaign: sleep, refresh, sync, and keep going while the
/// monitor keeps scheduling, within the attempt-window cap.
async fn reconnect_loop(core: SchedulerCore, device_id: String, mut delay: Duration) {
    let mut shutdown_rx = core.shutdown.subscribe();
    loop {
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
                continue;
            }
        }

        core.monitor.record_reconnect_attempt(&device_id);
        let Ok(permit) = Arc::clone(&core.semaphore).acquire_owned().await else {
            return;
        };

        // A reconnection attempt is a token refresh plus one sync.
        let verdict = match core.refresh.refresh_if_needed(&device_id).await {
            Ok(_) => {
                let result = core.orchestrator.sync_device(&device_id).await;
                core.monitor.observe(&result)
            }
            Err(e) => {
                warn!(%device_id, error = %e, "reconnect refresh failed");
                core.monitor.observe_probe(&device_id, Some(&e))
            }
        };
        drop(permit);

        match verdict {
            HealthVerdict::ScheduleReconnect { delay: next } => delay = next,
            _ => return,
        }
    }
}

/// Periodic liveness probe across all active connections
async fn probe_loop(core: SchedulerCore) {
    let mut shutdown_rx = core.shutdown.subscribe();
    loop {
        tokio::select! {
            () = tokio::time::sleep(core.config.probe_interval) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
                continue;
            }
        }

        for connection in core.registry.list_active().await {
            if core.shutting_down() {
                return;
            }
            let Some(adapter) = core.providers.get(connection.device_type) else {
                continue;
            };
            let Ok(permit) = Arc::clone(&core.semaphore).acquire_owned().await else {
                return;
            };

            let device_id = connection.device_id.clone();
            // The probe's main job is catching token expiry early, so give
            // the refresh path first crack before the liveness request.
            let outcome = match core.refresh.refresh_if_needed(&device_id).await {
                Ok(_) => match core.registry.get(&device_id).await {
                    Some(fresh) => adapter.probe(&fresh).await,
                    None => continue,
                },
                Err(e) => Err(e),
            };
            drop(permit);

            let verdict = core.monitor.observe_probe(&device_id, outcome.as_ref().err());
            core.handle_verdict(&device_id, verdict);
        }
    }
}

/// Per-connection timer: sync at the connection's cadence until the device
/// disappears, deactivates, or shutdown is signalled.
async fn device_loop(core: SchedulerCore, device_id: String) {
    let mut shutdown_rx = core.shutdown.subscribe();
    let mut next_due = None;

    loop {
        let Some(connection) = core.registry.get(&device_id).await else {
            debug!(%device_id, "device gone; timer stopping");
            return;
        };
        if !connection.is_active {
            debug!(%device_id, "device inactive; timer stopping");
            return;
        }

        let due = next_due.unwrap_or_else(|| connection.next_sync_due());
        let wait = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
                continue;
            }
        }

        let Ok(permit) = Arc::clone(&core.semaphore).acquire_owned().await else {
            return;
        };
        let result = core.orchestrator.sync_device(&device_id).await;
        drop(permit);

        // Failed syncs keep their cadence too; a device is never dropped
        // from scheduling over one failure.
        next_due = Some(result.next_sync);

        let verdict = core.monitor.observe(&result);
        core.handle_verdict(&device_id, verdict);

        if *shutdown_rx.borrow() {
            return;
        }
    }
}

/// Owns every scheduled task the engine runs
pub struct SyncScheduler {
    core: SchedulerCore,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    probe_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    /// Wire a scheduler from its collaborators
    #[must_use]
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        monitor: Arc<HealthMonitor>,
        refresh: Arc<TokenRefreshManager>,
        registry: Arc<ConnectionRegistry>,
        providers: Arc<ProviderRegistry>,
        config: ServiceConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            core: SchedulerCore {
                orchestrator,
                monitor,
                refresh,
                registry,
                providers,
                semaphore: Arc::new(Semaphore::new(config.worker_pool_size)),
                reconnects: Arc::new(DashMap::new()),
                shutdown: Arc::new(shutdown_tx),
                started: Arc::new(AtomicBool::new(false)),
                config,
            },
            tasks: Mutex::new(HashMap::new()),
            probe_task: Mutex::new(None),
        }
    }

    fn tasks_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// A receiver on the scheduler's shutdown signal, for cooperative
    /// cancellation of batch operations.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.core.shutdown.subscribe()
    }

    /// Start the probe loop and a timer for every active connection
    pub async fn start(&self) {
        self.core.started.store(true, Ordering::SeqCst);
        {
            let mut probe = match self.probe_task.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if probe.as_ref().is_none_or(JoinHandle::is_finished) {
                let core = self.core.clone();
                *probe = Some(tokio::spawn(probe_loop(core)));
            }
        }

        for connection in self.core.registry.list_active().await {
            self.watch_device(&connection.device_id);
        }
        info!("sync scheduler started");
    }

    /// Start (or restart) the sync timer for one device. No-op until the
    /// scheduler itself is started; `start` picks up earlier registrations.
    pub fn watch_device(&self, device_id: &str) {
        if !self.core.started.load(Ordering::SeqCst) {
            return;
        }
        let mut tasks = self.tasks_map();
        if let Some(existing) = tasks.remove(device_id) {
            existing.abort();
        }
        let core = self.core.clone();
        let id = device_id.to_owned();
        tasks.insert(id.clone(), tokio::spawn(device_loop(core, id)));
    }

    /// Stop all scheduled work for one device: its sync timer and any
    /// pending reconnection task.
    pub fn unwatch_device(&self, device_id: &str) {
        if let Some(handle) = self.tasks_map().remove(device_id) {
            handle.abort();
        }
        if let Some((_, handle)) = self.core.reconnects.remove(device_id) {
            handle.abort();
        }
        debug!(device_id, "scheduled work stopped");
    }

    /// Act on a health verdict produced outside the scheduler's own loops
    /// (manual sync calls through the service facade).
    pub fn handle_verdict(&self, device_id: &str, verdict: HealthVerdict) {
        self.core.handle_verdict(device_id, verdict);
    }

    /// Signal shutdown, drain in-flight work up to the grace period, then
    /// force-cancel whatever is left.
    pub async fn shutdown(&self) {
        self.core.started.store(false, Ordering::SeqCst);
        let _ = self.core.shutdown.send(true);

        let deadline = tokio::time::Instant::now() + self.core.config.shutdown_grace;
        loop {
            let busy = {
                let tasks = self.tasks_map();
                tasks.values().any(|h| !h.is_finished())
                    || self.core.reconnects.iter().any(|e| !e.value().is_finished())
            };
            if !busy || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        for (_, handle) in self.tasks_map().drain() {
            handle.abort();
        }
        for entry in self.core.reconnects.iter() {
            entry.value().abort();
        }
        self.core.reconnects.clear();
        if let Ok(mut probe) = self.probe_task.lock() {
            if let Some(handle) = probe.take() {
                handle.abort();
            }
        }
        info!("sync scheduler stopped");
    }
}
