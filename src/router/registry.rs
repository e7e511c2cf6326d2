// Copyright (c) 2025 - Cowboy AI, LLC.

//! Sharded concurrent model registry.
//!
//! Generalizes `ai_providers::provider_manager`'s `Arc<RwLock<HashMap<_>>>`
//! single-lock pattern into per-model-key entries behind a
//! `dashmap::DashMap`, so a metrics update for one model never blocks a
//! selection scan touching a different model (spec.md §5's "linearizable
//! per model_key" requirement — see DESIGN.md).

use crate::value_objects::{CircuitState, LoadMetrics, ModelDescriptor, ModelKey, ModelPerformanceMetrics};
use dashmap::DashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub descriptor: ModelDescriptor,
    pub performance: ModelPerformanceMetrics,
    pub load: LoadMetrics,
    pub circuit: CircuitState,
}

impl ModelEntry {
    fn new(descriptor: ModelDescriptor) -> Self {
        Self {
            descriptor,
            performance: ModelPerformanceMetrics::default(),
            load: LoadMetrics::default(),
            circuit: CircuitState::default(),
        }
    }
}

/// Concurrent map from `ModelKey` to that model's live descriptor and
/// router-maintained state.
#[derive(Default)]
pub struct ModelRegistry {
    entries: DashMap<ModelKey, ModelEntry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, descriptor: ModelDescriptor) {
        self.entries
            .entry(descriptor.key())
            .and_modify(|e| e.descriptor = descriptor.clone())
            .or_insert_with(|| ModelEntry::new(descriptor));
    }

    pub fn get(&self, key: &ModelKey) -> Option<ModelEntry> {
        self.entries.get(key).map(|e| e.clone())
    }

    pub fn snapshot(&self) -> Vec<(ModelKey, ModelEntry)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Increment in-flight load for `key`. Returns a guard that decrements
    /// on drop, so load is always released even on panic or early return
    /// from the caller's future.
    pub fn begin_request(&self, key: &ModelKey) -> LoadGuard<'_> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.load.in_flight += 1;
        }
        LoadGuard { registry: self, key: key.clone() }
    }

    pub fn record_success(&self, key: &ModelKey, latency: Duration, tokens: u32) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.performance.record_success(latency, tokens);
            entry.circuit = CircuitState::Closed;
        }
    }

    pub fn record_failure(&self, key: &ModelKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.performance.record_failure();
            entry.circuit = entry.circuit.evaluate_trip(&entry.performance);
        }
    }

    /// Reset performance counters for models idle past `idle_timeout`
    /// (router maintenance task, spec.md §4.2: 60s tick, 1h idle window).
    pub fn reset_stale_metrics(&self, idle_timeout: Duration) {
        for mut entry in self.entries.iter_mut() {
            if entry.performance.is_stale(idle_timeout) {
                entry.performance = ModelPerformanceMetrics::default();
            }
        }
    }

    /// Auto-close circuits open past `reset_after` (router maintenance
    /// task, spec.md §4.2: 5m tick, 10m reset window).
    pub fn reset_expired_circuits(&self, reset_after: Duration) {
        for mut entry in self.entries.iter_mut() {
            entry.circuit = entry.circuit.maybe_reset(reset_after);
        }
    }
}

pub struct LoadGuard<'a> {
    registry: &'a ModelRegistry,
    key: ModelKey,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut entry) = self.registry.entries.get_mut(&self.key) {
            entry.load.in_flight = entry.load.in_flight.saturating_sub(1);
        }
    }
}
