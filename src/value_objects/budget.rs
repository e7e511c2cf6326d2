// Copyright (c) 2025 - Cowboy AI, LLC.

//! Budget and usage value objects for the Token/Budget Manager.
//!
//! All money fields are `rust_decimal::Decimal` — never floats — per
//! spec.md Design Notes §9 ("Money"). Amounts are conventionally rounded
//! half-up to 6 fractional digits (1 micro-USD) before being persisted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Persistent per-(tenant, user) budget ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetRecord {
    pub tenant_id: String,
    pub user_id: String,
    pub total_budget: Decimal,
    pub used_budget: Decimal,
    pub daily_limit: Option<Decimal>,
    pub monthly_limit: Option<Decimal>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl BudgetRecord {
    pub fn remaining(&self) -> Decimal {
        (self.total_budget - self.used_budget).max(Decimal::ZERO)
    }

    pub fn utilization(&self) -> f64 {
        if self.total_budget.is_zero() {
            return 1.0;
        }
        (self.used_budget / self.total_budget)
            .to_string()
            .parse()
            .unwrap_or(1.0)
    }
}

/// A completed, settled unit of spend. `request_id` is the idempotence key:
/// settling the same request twice must not double-charge (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub request_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub model_name: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A held-but-not-yet-settled amount, TTL'd in the ephemeral store so a
/// crashed request doesn't permanently lock funds (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub request_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Classification of a budget-utilization threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Warning,
    LimitReached,
    Exceeded,
}

impl AlertLevel {
    /// Classify a crossed threshold percentage (e.g. 0.9 for 90%).
    pub fn for_threshold(threshold: f64) -> Self {
        if threshold >= 1.0 {
            AlertLevel::Exceeded
        } else if threshold >= 0.9 {
            AlertLevel::LimitReached
        } else {
            AlertLevel::Warning
        }
    }
}

/// A fired budget alert, persisted for audit and surfaced via the
/// out-of-scope metrics surface (spec.md §1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub tenant_id: String,
    pub user_id: String,
    pub threshold: f64,
    pub level: AlertLevel,
    pub utilization: f64,
    pub fired_at: DateTime<Utc>,
}
