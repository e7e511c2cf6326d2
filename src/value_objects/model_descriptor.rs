// Copyright (c) 2025 - Cowboy AI, LLC.

//! Router-facing model metadata and live performance/load/circuit state.
//!
//! Named `ModelPerformanceMetrics` rather than `PerformanceMetrics` to keep
//! model serving latency/throughput distinct from agent task outcomes.

use super::ProviderType;
use crate::capabilities::RuntimeCapabilities;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Stable identifier for a routable model: `(provider, model_name)`.
pub type ModelKey = (ProviderType, String);

/// Static description of a model the router can select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub provider: ProviderType,
    pub model_name: String,
    pub capabilities: RuntimeCapabilities,
    pub max_context_length: u32,
    /// Ceiling on a single request's `max_tokens`, distinct from
    /// `max_context_length` (spec.md §3's `max_tokens` vs `context_length`).
    pub max_output_tokens: u32,
    pub cost_per_1k_prompt_tokens: Decimal,
    pub cost_per_1k_completion_tokens: Decimal,
    pub max_concurrency: u32,
    /// Operator-assigned quality prior in `[0,1]`, spec.md §3's
    /// `capability_score`; the router's scoring `base` factor (§4.2).
    pub capability_score: f32,
}

impl ModelDescriptor {
    pub fn key(&self) -> ModelKey {
        (self.provider, self.model_name.clone())
    }
}

/// Rolling performance metrics for one model, updated after every request.
///
/// Latency and throughput are tracked as exponential moving averages
/// (`alpha = 0.1`), matching `original_source/.../core/model_router.py`'s
/// `_update_performance_metrics`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPerformanceMetrics {
    pub avg_latency_ms: f64,
    pub avg_tokens_per_sec: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_updated: Option<Instant>,
}

impl Default for ModelPerformanceMetrics {
    fn default() -> Self {
        Self {
            avg_latency_ms: 0.0,
            avg_tokens_per_sec: 0.0,
            success_count: 0,
            failure_count: 0,
            last_updated: None,
        }
    }
}

const EMA_ALPHA: f64 = 0.1;

impl ModelPerformanceMetrics {
    pub fn total_requests(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn failure_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.failure_count as f64 / total as f64
        }
    }

    /// Fold in a successful completion's observed latency/throughput.
    pub fn record_success(&mut self, latency: Duration, tokens: u32) {
        let latency_ms = latency.as_secs_f64() * 1000.0;
        let tokens_per_sec = if latency.as_secs_f64() > 0.0 {
            tokens as f64 / latency.as_secs_f64()
        } else {
            0.0
        };

        self.avg_latency_ms = ema(self.avg_latency_ms, latency_ms, self.success_count == 0);
        self.avg_tokens_per_sec = ema(
            self.avg_tokens_per_sec,
            tokens_per_sec,
            self.success_count == 0,
        );
        self.success_count += 1;
        self.last_updated = Some(Instant::now());
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_updated = Some(Instant::now());
    }

    /// True once the 1-hour idle window has elapsed, at which point the
    /// router's maintenance task resets these counters (spec.md §4.2).
    pub fn is_stale(&self, idle_timeout: Duration) -> bool {
        match self.last_updated {
            Some(t) => t.elapsed() >= idle_timeout,
            None => false,
        }
    }
}

fn ema(current: f64, sample: f64, is_first: bool) -> f64 {
    if is_first {
        sample
    } else {
        EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * current
    }
}

/// In-flight concurrency tracking for load-aware scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadMetrics {
    pub in_flight: u32,
}

impl LoadMetrics {
    pub fn utilization(&self, max_concurrency: u32) -> f64 {
        if max_concurrency == 0 {
            1.0
        } else {
            (self.in_flight as f64 / max_concurrency as f64).min(1.0)
        }
    }
}

/// Circuit breaker state machine for a model.
///
/// Trips open when `failure_rate > 0.5` with at least 10 total requests;
/// resets to closed after 10 minutes of no further failures, per spec.md
/// §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { tripped_at: Instant },
}

impl Default for CircuitState {
    fn default() -> Self {
        CircuitState::Closed
    }
}

impl CircuitState {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitState::Open { .. })
    }

    /// Evaluate whether accumulated metrics should trip the breaker.
    pub fn evaluate_trip(self, metrics: &ModelPerformanceMetrics) -> Self {
        if self.is_open() {
            return self;
        }
        if metrics.total_requests() >= 10 && metrics.failure_rate() > 0.5 {
            CircuitState::Open {
                tripped_at: Instant::now(),
            }
        } else {
            self
        }
    }

    /// Auto-close after the reset window has elapsed.
    pub fn maybe_reset(self, reset_after: Duration) -> Self {
        match self {
            CircuitState::Open { tripped_at } if tripped_at.elapsed() >= reset_after => {
                CircuitState::Closed
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_first_sample_is_exact() {
        let mut m = ModelPerformanceMetrics::default();
        m.record_success(Duration::from_millis(100), 50);
        assert_eq!(m.avg_latency_ms, 100.0);
    }

    #[test]
    fn ema_smooths_subsequent_samples() {
        let mut m = ModelPerformanceMetrics::default();
        m.record_success(Duration::from_millis(100), 50);
        m.record_success(Duration::from_millis(200), 50);
        // 0.1*200 + 0.9*100 = 110
        assert!((m.avg_latency_ms - 110.0).abs() < 1e-9);
    }

    #[test]
    fn circuit_trips_above_threshold_with_enough_volume() {
        let mut metrics = ModelPerformanceMetrics::default();
        for _ in 0..4 {
            metrics.record_success(Duration::from_millis(10), 10);
        }
        for _ in 0..6 {
            metrics.record_failure();
        }
        assert!(metrics.failure_rate() > 0.5);
        let state = CircuitState::Closed.evaluate_trip(&metrics);
        assert!(state.is_open());
    }

    #[test]
    fn circuit_does_not_trip_below_volume_floor() {
        let mut metrics = ModelPerformanceMetrics::default();
        metrics.record_failure();
        metrics.record_failure();
        let state = CircuitState::Closed.evaluate_trip(&metrics);
        assert!(!state.is_open());
    }

    #[test]
    fn circuit_resets_after_window() {
        let state = CircuitState::Open {
            tripped_at: Instant::now() - Duration::from_secs(700),
        };
        let reset = state.maybe_reset(Duration::from_secs(600));
        assert_eq!(reset, CircuitState::Closed);
    }
}
