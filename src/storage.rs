// ABOUTME: Storage collaborator boundary for persisting canonical samples
// ABOUTME: SampleStore trait plus an in-memory implementation for tests and the demo daemon
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use crate::models::CanonicalSample;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage collaborator failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or timed out
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    /// Backend refused the write
    #[error("storage rejected write: {0}")]
    Rejected(String),
}

/// Persistence boundary consumed by the sync orchestrator.
///
/// Fire-and-confirm: a failure here surfaces as a failed `Persisting` sync
/// stage, never a silent success.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Persist one batch of canonical samples for a device.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot confirm the write.
    async fn persist(
        &self,
        device_id: &str,
        user_id: Uuid,
        samples: &[CanonicalSample],
    ) -> Result<(), StoreError>;
}

/// In-memory store for tests and the demo daemon
pub struct InMemoryStore {
    samples: RwLock<HashMap<String, Vec<CanonicalSample>>>,
}

impl InMemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            samples: RwLock::new(HashMap::new()),
        }
    }

    /// Number of samples persisted for a device
    pub async fn count(&self, device_id: &str) -> usize {
        self.samples
            .read()
            .await
            .get(device_id)
            .map_or(0, Vec::len)
    }

    /// Snapshot of a device's persisted samples
    pub async fn samples_for(&self, device_id: &str) -> Vec<CanonicalSample> {
        self.samples
            .read()
            .await
            .get(device_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleStore for InMemoryStore {
    async fn persist(
        &self,
        device_id: &str,
        _user_id: Uuid,
        samples: &[CanonicalSample],
    ) -> Result<(), StoreError> {
        self.samples
            .write()
            .await
            .entry(device_id.to_owned())
            .or_default()
            .extend_from_slice(samples);
        Ok(())
    }
}
