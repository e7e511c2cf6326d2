// Copyright (c) 2025 - Cowboy AI, LLC.

//! Relational Port - durable storage for budget ledgers, usage history,
//! alerts, and conversation memory. Backed by whatever relational store the
//! deployment chooses (out of scope per spec.md §1); this crate only
//! defines the access contract.

use crate::value_objects::{BudgetAlert, BudgetRecord, MemoryEntry, UsageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelationalError {
    #[error("relational backend error: {0}")]
    Backend(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("unique constraint violated: {0}")]
    Conflict(String),
}

pub type RelationalResult<T> = Result<T, RelationalError>;

#[async_trait]
pub trait RelationalPort: Send + Sync {
    async fn get_budget(&self, tenant_id: &str, user_id: &str) -> RelationalResult<BudgetRecord>;

    async fn upsert_budget(&self, record: &BudgetRecord) -> RelationalResult<()>;

    /// Insert a usage record. Must be a no-op (not an error) if a record
    /// with the same `request_id` already exists - this is the idempotence
    /// guard for `Settle` (spec.md §4.5).
    async fn insert_usage_if_absent(&self, record: &UsageRecord) -> RelationalResult<bool>;

    /// Sum of `cost_usd` for usage records in `[since, now)` for this user.
    async fn usage_sum_since(
        &self,
        tenant_id: &str,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> RelationalResult<Decimal>;

    async fn record_alert(&self, alert: &BudgetAlert) -> RelationalResult<()>;

    /// Whether an alert at this threshold has already fired for this user
    /// in the current window, so alerts are not re-sent every request.
    async fn alert_already_fired(
        &self,
        tenant_id: &str,
        user_id: &str,
        threshold_bits: u64,
        window_start: DateTime<Utc>,
    ) -> RelationalResult<bool>;

    async fn load_memories(
        &self,
        user_id: &str,
        session_id: &str,
        limit: usize,
    ) -> RelationalResult<Vec<MemoryEntry>>;

    async fn store_memory(&self, entry: &MemoryEntry) -> RelationalResult<()>;

    /// Delete memories older than `older_than`, returning the count removed.
    /// Backs the context engine's hourly memory GC (spec.md §4.3).
    async fn prune_memories(&self, older_than: DateTime<Utc>) -> RelationalResult<usize>;

    /// Zero `used_budget` on every daily-capped account, returning the
    /// number of accounts reset. Backs the budget manager's local-midnight
    /// reset task (spec.md §4.5).
    async fn reset_daily_budgets(&self) -> RelationalResult<usize>;

    /// Zero `used_budget` on every monthly-capped account, returning the
    /// number of accounts reset. Backs the budget manager's first-of-month
    /// reset task (spec.md §4.5).
    async fn reset_monthly_budgets(&self) -> RelationalResult<usize>;

    /// Roll settled usage since `since` up into an aggregate table, returning
    /// the number of usage records folded in. Backs the budget manager's
    /// periodic usage-aggregation task (spec.md §4.5).
    async fn aggregate_usage(&self, since: DateTime<Utc>) -> RelationalResult<usize>;
}
