// Copyright (c) 2025 - Cowboy AI, LLC.

//! Adaptive Model Router (spec.md §4.2).
//!
//! Combines the sharded [`registry::ModelRegistry`] and [`scoring::score`]
//! weighting into the selection algorithm: feasibility filter, then
//! highest-score pick, ties broken by the registry snapshot's iteration
//! order. Background maintenance (stale-performance reset, circuit
//! auto-close) runs as `tokio::spawn` loops owned by the `Router`,
//! cancelled through a `CancellationToken` on `shutdown()`, mirroring
//! `src/bin/agent-service.rs`'s `tokio::select!` shutdown discipline.

mod registry;
mod scoring;

pub use registry::{LoadGuard, ModelEntry, ModelRegistry};

use crate::ports::{ProviderError, ProviderPort};
use crate::value_objects::{ChatRequest, ModelDescriptor, ModelKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum RouterError {
    /// No registered model survived the feasibility filter for this
    /// request (spec.md §7: maps to 503 at the pipeline boundary).
    #[error("no eligible model for request")]
    CircuitOpen,

    #[error("unknown model requested: {0}")]
    UnknownModel(String),

    #[error("router internal error: {0}")]
    Internal(String),
}

/// Tunables for the router's maintenance tasks, read from the environment
/// with spec.md-documented defaults.
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Models idle this long have their performance counters reset.
    pub performance_idle_timeout: Duration,
    /// How often the idle-performance sweep runs.
    pub performance_reset_interval: Duration,
    /// Open circuits idle this long auto-close (half-open trial).
    pub circuit_reset_after: Duration,
    /// How often the circuit sweep runs.
    pub circuit_reset_interval: Duration,
    /// Feasibility ceiling on load factor (spec.md §4.2: `load_factor > 0.9`
    /// is rejected).
    pub max_load_factor: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            performance_idle_timeout: Duration::from_secs(60 * 60),
            performance_reset_interval: Duration::from_secs(60),
            circuit_reset_after: Duration::from_secs(10 * 60),
            circuit_reset_interval: Duration::from_secs(5 * 60),
            max_load_factor: 0.9,
        }
    }
}

impl RouterConfig {
    /// Load from the environment, falling back to spec.md defaults for any
    /// variable that is absent or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            performance_idle_timeout: env_secs(
                "ROUTER_PERFORMANCE_IDLE_SECS",
                defaults.performance_idle_timeout,
            ),
            performance_reset_interval: env_secs(
                "ROUTER_PERFORMANCE_RESET_INTERVAL_SECS",
                defaults.performance_reset_interval,
            ),
            circuit_reset_after: env_secs("ROUTER_CIRCUIT_RESET_SECS", defaults.circuit_reset_after),
            circuit_reset_interval: env_secs(
                "ROUTER_CIRCUIT_RESET_INTERVAL_SECS",
                defaults.circuit_reset_interval,
            ),
            max_load_factor: std::env::var("ROUTER_MAX_LOAD_FACTOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_load_factor),
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// The Adaptive Model Router: owns live per-model state and the provider
/// handles it dispatches execution to.
pub struct Router {
    registry: Arc<ModelRegistry>,
    providers: HashMap<crate::value_objects::ProviderType, Arc<dyn ProviderPort>>,
    config: RouterConfig,
    shutdown: CancellationToken,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            registry: Arc::new(ModelRegistry::new()),
            providers: HashMap::new(),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_provider(
        mut self,
        provider_type: crate::value_objects::ProviderType,
        provider: Arc<dyn ProviderPort>,
    ) -> Self {
        self.providers.insert(provider_type, provider);
        self
    }

    pub fn provider_for(&self, key: &ModelKey) -> Option<Arc<dyn ProviderPort>> {
        self.providers.get(&key.0).cloned()
    }

    /// Refresh the registry from every registered provider's `list_models`.
    /// Grounded on spec.md §3: "refreshed on provider reconnect".
    pub async fn refresh_models(&self) -> Result<(), ProviderError> {
        for provider in self.providers.values() {
            let models = provider.list_models().await?;
            for descriptor in models {
                self.registry.upsert(descriptor);
            }
        }
        Ok(())
    }

    pub fn upsert_model(&self, descriptor: ModelDescriptor) {
        self.registry.upsert(descriptor);
    }

    /// Feasibility filter, spec.md §4.2: reject a model if any hold.
    fn is_feasible(&self, entry: &ModelEntry, request: &ChatRequest) -> bool {
        if entry.circuit.is_open() {
            return false;
        }
        if entry.load.utilization(entry.descriptor.max_concurrency) > self.config.max_load_factor {
            return false;
        }
        if let Some(max_tokens) = request.max_tokens {
            if max_tokens > entry.descriptor.max_output_tokens {
                return false;
            }
        }
        let estimated_context = request.messages.len() as u32 * 100;
        if estimated_context > entry.descriptor.max_context_length {
            return false;
        }
        if !request.tools.is_empty()
            && !entry
                .descriptor
                .capabilities
                .contains(crate::capabilities::RuntimeCapabilities::FUNCTION_CALLING)
        {
            return false;
        }
        if request.stream
            && !entry
                .descriptor
                .capabilities
                .contains(crate::capabilities::RuntimeCapabilities::STREAMING)
        {
            return false;
        }
        if !self.providers.contains_key(&entry.descriptor.provider) {
            return false;
        }
        true
    }

    /// Select the `(provider, model)` pair maximizing the strategy-weighted
    /// score among feasible candidates. Ties broken by the snapshot's
    /// iteration order (spec.md §4.2).
    pub fn select_optimal(
        &self,
        request: &ChatRequest,
    ) -> Result<(ModelKey, ModelDescriptor), RouterError> {
        let strategy = request.optimization_strategy.unwrap_or_default();

        if let Some(preferred) = &request.preferred_model {
            if let Some((key, entry)) = self
                .registry
                .snapshot()
                .into_iter()
                .find(|(key, _)| &key.1 == preferred)
            {
                if self.is_feasible(&entry, request) {
                    return Ok((key, entry.descriptor));
                }
            }
        }

        let mut best: Option<(ModelKey, ModelDescriptor, f64)> = None;
        for (key, entry) in self.registry.snapshot() {
            if !self.is_feasible(&entry, request) {
                continue;
            }
            let s = scoring::score(
                strategy,
                &entry.descriptor,
                request,
                &entry.performance,
                &entry.load,
                entry.circuit.is_open(),
            );
            let is_better = match &best {
                Some((_, _, best_score)) => s > *best_score,
                None => true,
            };
            if is_better {
                best = Some((key, entry.descriptor, s));
            }
        }

        best.map(|(key, descriptor, _)| (key, descriptor))
            .ok_or(RouterError::CircuitOpen)
    }

    /// Begin tracking an in-flight request against `key`'s concurrency
    /// counter; the returned guard decrements on drop (§5: "always
    /// decremented exactly once").
    pub fn begin_request(&self, key: &ModelKey) -> LoadGuard<'_> {
        self.registry.begin_request(key)
    }

    pub fn record_success(&self, key: &ModelKey, latency: Duration, tokens: u32) {
        self.registry.record_success(key, latency, tokens);
    }

    pub fn record_failure(&self, key: &ModelKey) {
        self.registry.record_failure(key);
    }

    pub fn snapshot(&self) -> Vec<(ModelKey, ModelEntry)> {
        self.registry.snapshot()
    }

    /// Spawn the two background maintenance loops (spec.md §4.2). Returns
    /// immediately; loops run until `shutdown()` is called or the returned
    /// handles are dropped.
    pub fn spawn_maintenance(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let token = this.shutdown.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(this.config.performance_reset_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        this.registry.reset_stale_metrics(this.config.performance_idle_timeout);
                    }
                }
            }
        });

        let this = Arc::clone(self);
        let token = this.shutdown.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(this.config.circuit_reset_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        this.registry.reset_expired_circuits(this.config.circuit_reset_after);
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
