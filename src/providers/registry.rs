// ABOUTME: Adapter registry mapping each device type to its wearable provider implementation
// ABOUTME: Replaces per-provider branching with a factory keyed by the DeviceType enum
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use crate::models::DeviceType;
use crate::providers::bridge::BridgeProvider;
use crate::providers::core::WearableProvider;
use crate::providers::fitbit::FitbitProvider;
use crate::providers::garmin::GarminProvider;
use crate::providers::oura::OuraProvider;
use crate::providers::polar::PolarProvider;
use crate::providers::whoop::WhoopProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Registry of provider adapters, keyed by [`DeviceType`].
///
/// Adapters are stateless and shared: one `Arc` instance per brand serves
/// every connection of that brand. [`ProviderRegistry::register`] replaces an
/// existing adapter, which is also the seam tests use to install mocks.
pub struct ProviderRegistry {
    adapters: HashMap<DeviceType, Arc<dyn WearableProvider>>,
}

impl ProviderRegistry {
    /// Registry with every built-in adapter, configured from the environment
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(BridgeProvider::apple_watch()));
        registry.register(Arc::new(WhoopProvider::new()));
        registry.register(Arc::new(GarminProvider::new()));
        registry.register(Arc::new(FitbitProvider::new()));
        registry.register(Arc::new(BridgeProvider::samsung()));
        registry.register(Arc::new(OuraProvider::new()));
        registry.register(Arc::new(PolarProvider::new()));

        info!(
            providers = registry.adapters.len(),
            "provider registry initialized"
        );
        registry
    }

    /// Registry with no adapters; callers register their own
    #[must_use]
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register (or replace) the adapter for its device type
    pub fn register(&mut self, adapter: Arc<dyn WearableProvider>) {
        self.adapters.insert(adapter.device_type(), adapter);
    }

    /// The adapter for a device type, if one is registered
    #[must_use]
    pub fn get(&self, device_type: DeviceType) -> Option<Arc<dyn WearableProvider>> {
        self.adapters.get(&device_type).cloned()
    }

    /// Whether a device type has a registered adapter
    #[must_use]
    pub fn is_supported(&self, device_type: DeviceType) -> bool {
        self.adapters.contains_key(&device_type)
    }

    /// Device types with registered adapters
    #[must_use]
    pub fn supported_types(&self) -> Vec<DeviceType> {
        self.adapters.keys().copied().collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
