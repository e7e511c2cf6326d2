// Copyright (c) 2025 - Cowboy AI, LLC.

//! Pre-flight cost estimation, grounded on
//! `original_source/core/token_manager.py::estimate_cost`.

use crate::value_objects::{ChatRequest, ModelDescriptor, TokenUsage};
use rust_decimal::{Decimal, RoundingStrategy};

/// Output-token cost multiplier by model-name prefix, mirroring the
/// original's `prompt_cost_multiplier`/`completion_cost_multiplier` split:
/// applied only to the completion-token cost component.
fn completion_multiplier(model_name: &str) -> Decimal {
    if model_name.starts_with("gpt-4") {
        Decimal::from(2)
    } else if model_name.starts_with("claude-3-opus") || model_name.starts_with("claude-opus") {
        Decimal::from(3)
    } else {
        Decimal::ONE
    }
}

/// Estimated prompt/completion token counts and the resulting cost, before
/// a single token has been generated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: Decimal,
}

/// `prompt_tokens ~= sum(len(content))/4 + 10*n_messages +
/// len(serialized tools)`; `completion_tokens = max_tokens` or 500.
pub fn estimate(request: &ChatRequest, descriptor: &ModelDescriptor) -> Estimate {
    let content_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
    let tool_chars: usize = if request.tools.is_empty() {
        0
    } else {
        serde_json::to_string(&request.tools).map(|s| s.len()).unwrap_or(0)
    };

    let prompt_tokens =
        (content_chars / 4) as u32 + 10 * request.messages.len() as u32 + (tool_chars / 4) as u32;
    let completion_tokens = request.max_tokens.unwrap_or(500);

    let prompt_cost =
        descriptor.cost_per_1k_prompt_tokens * Decimal::from(prompt_tokens) / Decimal::from(1000);
    let completion_cost = descriptor.cost_per_1k_completion_tokens
        * Decimal::from(completion_tokens)
        / Decimal::from(1000)
        * completion_multiplier(&descriptor.model_name);

    let cost_usd = (prompt_cost + completion_cost)
        .round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero);

    Estimate {
        prompt_tokens,
        completion_tokens,
        cost_usd,
    }
}

/// Cost for an actually-observed `TokenUsage`, using the same per-1k
/// pricing and output multiplier as `estimate`. Providers report token
/// counts but not cost, so the pipeline derives the billed amount from
/// this rather than trusting an adapter-supplied figure.
pub fn cost_for_usage(usage: TokenUsage, descriptor: &ModelDescriptor) -> Decimal {
    let prompt_cost =
        descriptor.cost_per_1k_prompt_tokens * Decimal::from(usage.prompt_tokens) / Decimal::from(1000);
    let completion_cost = descriptor.cost_per_1k_completion_tokens
        * Decimal::from(usage.completion_tokens)
        / Decimal::from(1000)
        * completion_multiplier(&descriptor.model_name);

    (prompt_cost + completion_cost).round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero)
}
