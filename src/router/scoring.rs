// Copyright (c) 2025 - Cowboy AI, LLC.

//! Five-factor weighted scoring, grounded verbatim on
//! `original_source/core/model_router.py::_calculate_selection_score` and
//! its per-strategy weight tables.

use crate::value_objects::{ChatRequest, ModelDescriptor, ModelPerformanceMetrics, OptimizationStrategy};
use rust_decimal::prelude::ToPrimitive;

/// `[base, performance, cost, load, availability]`, summing to 1.0.
fn weights(strategy: OptimizationStrategy) -> [f64; 5] {
    match strategy {
        OptimizationStrategy::Cost => [0.2, 0.1, 0.6, 0.05, 0.05],
        OptimizationStrategy::Performance => [0.3, 0.5, 0.1, 0.05, 0.05],
        OptimizationStrategy::Availability => [0.2, 0.2, 0.2, 0.3, 0.1],
        OptimizationStrategy::Balanced => [0.3, 0.25, 0.25, 0.15, 0.05],
    }
}

fn performance_factor(metrics: &ModelPerformanceMetrics) -> f64 {
    if metrics.total_requests() == 0 {
        return 0.5;
    }
    let success_rate = 1.0 - metrics.failure_rate();
    let success_component = success_rate * 0.7;
    let latency_seconds = metrics.avg_latency_ms / 1000.0;
    let latency_component = (1.0 - (latency_seconds / 10.0)).max(0.0) * 0.3;
    success_component + latency_component
}

/// Estimated request cost normalized against a $1.00 reasonable-request
/// ceiling; lower cost scores higher.
fn cost_factor(descriptor: &ModelDescriptor, request: &ChatRequest) -> f64 {
    let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
    let prompt_tokens = (prompt_chars / 4) as u64;
    let completion_tokens = request.max_tokens.unwrap_or(500) as u64;

    let prompt_cost = descriptor.cost_per_1k_prompt_tokens * rust_decimal::Decimal::from(prompt_tokens)
        / rust_decimal::Decimal::from(1000);
    let completion_cost = descriptor.cost_per_1k_completion_tokens
        * rust_decimal::Decimal::from(completion_tokens)
        / rust_decimal::Decimal::from(1000);
    let estimated_cost = (prompt_cost + completion_cost).to_f64().unwrap_or(0.0);

    (1.0 - (estimated_cost / 1.0)).clamp(0.0, 1.0)
}

fn load_factor(load: &crate::value_objects::LoadMetrics, max_concurrency: u32) -> f64 {
    1.0 - load.utilization(max_concurrency) as f64
}

fn availability_factor(circuit_open: bool) -> f64 {
    if circuit_open {
        0.0
    } else {
        1.0
    }
}

/// Weighted score in `[0, 1]`, higher is better.
pub fn score(
    strategy: OptimizationStrategy,
    descriptor: &ModelDescriptor,
    request: &ChatRequest,
    performance: &ModelPerformanceMetrics,
    load: &crate::value_objects::LoadMetrics,
    circuit_open: bool,
) -> f64 {
    let w = weights(strategy);
    let factors = [
        descriptor.capability_score as f64,
        performance_factor(performance),
        cost_factor(descriptor, request),
        load_factor(load, descriptor.max_concurrency),
        availability_factor(circuit_open),
    ];
    let total: f64 = w.iter().zip(factors.iter()).map(|(w, f)| w * f).sum();
    total.clamp(0.0, 1.0)
}
