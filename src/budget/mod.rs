// Copyright (c) 2025 - Cowboy AI, LLC.

//! Token / Budget Manager.
//!
//! Owns the reserve → execute → settle/release transaction discipline
//! around a per-`(tenant, user)` budget ledger, grounded on
//! `original_source/core/token_manager.py` for the cost formula,
//! reservation semantics, and alerting rules, and on
//! `ai_providers/provider_manager.rs`'s `RwLock`-guarded cache pattern
//! generalized to a per-key critical section via `dashmap`.

mod alerts;
mod estimate;

pub use estimate::{cost_for_usage, estimate, Estimate};

use crate::ports::{EphemeralKVPort, RelationalError, RelationalPort};
use crate::value_objects::{BudgetRecord, ChatRequest, ModelDescriptor, UsageRecord};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("budget exceeded: requested {requested}, remaining {remaining}")]
    Exceeded { requested: Decimal, remaining: Decimal },

    #[error("daily budget cap exceeded")]
    DailyCapExceeded,

    #[error("monthly budget cap exceeded")]
    MonthlyCapExceeded,

    #[error(transparent)]
    Relational(#[from] RelationalError),

    #[error(transparent)]
    Kv(#[from] crate::ports::KVError),
}

#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub cost_tracking_enabled: bool,
    pub budget_enforcement_enabled: bool,
    pub default_budget: Decimal,
    pub reservation_ttl: Duration,
    pub cache_reload_interval: Duration,
    pub usage_aggregation_interval: Duration,
    pub reset_check_interval: Duration,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            cost_tracking_enabled: true,
            budget_enforcement_enabled: true,
            default_budget: Decimal::from(100),
            reservation_ttl: Duration::from_secs(300),
            cache_reload_interval: Duration::from_secs(5 * 60),
            usage_aggregation_interval: Duration::from_secs(60 * 60),
            reset_check_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl BudgetConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cost_tracking_enabled: std::env::var("BUDGET_COST_TRACKING_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cost_tracking_enabled),
            budget_enforcement_enabled: std::env::var("BUDGET_ENFORCEMENT_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.budget_enforcement_enabled),
            default_budget: std::env::var("BUDGET_DEFAULT_USD")
                .ok()
                .and_then(|v| Decimal::from_str_exact(&v).ok())
                .unwrap_or(defaults.default_budget),
            ..defaults
        }
    }
}

type TenantUser = (String, String);

/// The Token / Budget Manager: per-`(tenant, user)` reservation ledger.
pub struct BudgetManager {
    config: BudgetConfig,
    relational: Arc<dyn RelationalPort>,
    kv: Arc<dyn EphemeralKVPort>,
    cached_remaining: DashMap<TenantUser, Decimal>,
    locks: DashMap<TenantUser, Arc<AsyncMutex<()>>>,
    last_daily_reset: Mutex<Option<NaiveDate>>,
    last_monthly_reset: Mutex<Option<(i32, u32)>>,
    last_aggregated_at: Mutex<DateTime<Utc>>,
    shutdown: CancellationToken,
}

impl BudgetManager {
    pub fn new(config: BudgetConfig, relational: Arc<dyn RelationalPort>, kv: Arc<dyn EphemeralKVPort>) -> Self {
        Self {
            config,
            relational,
            kv,
            cached_remaining: DashMap::new(),
            locks: DashMap::new(),
            last_daily_reset: Mutex::new(None),
            last_monthly_reset: Mutex::new(None),
            last_aggregated_at: Mutex::new(Utc::now()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn estimate(&self, request: &ChatRequest, descriptor: &ModelDescriptor) -> Estimate {
        estimate::estimate(request, descriptor)
    }

    fn lock_for(&self, key: &TenantUser) -> Arc<AsyncMutex<()>> {
        self.locks.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    async fn load_record(&self, tenant_id: &str, user_id: &str) -> Result<BudgetRecord, BudgetError> {
        match self.relational.get_budget(tenant_id, user_id).await {
            Ok(record) => Ok(record),
            Err(RelationalError::NotFound(_)) => {
                let record = BudgetRecord {
                    tenant_id: tenant_id.to_string(),
                    user_id: user_id.to_string(),
                    total_budget: self.config.default_budget,
                    used_budget: Decimal::ZERO,
                    daily_limit: None,
                    monthly_limit: None,
                    reset_at: None,
                };
                self.relational.upsert_budget(&record).await?;
                Ok(record)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Hold `amount` against the `(tenant, user)` ledger for `request_id`.
    /// Checks cached remaining, then daily/monthly caps; writes a TTL'd
    /// reservation to the ephemeral store (spec.md §4.5).
    pub async fn reserve(
        &self,
        tenant_id: &str,
        user_id: &str,
        request_id: &str,
        amount: Decimal,
    ) -> Result<(), BudgetError> {
        if !self.config.budget_enforcement_enabled {
            return Ok(());
        }

        let key = (tenant_id.to_string(), user_id.to_string());
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let record = self.load_record(tenant_id, user_id).await?;
        let remaining = match self.cached_remaining.get(&key) {
            Some(cached) => *cached,
            None => record.remaining(),
        };

        if remaining < amount {
            return Err(BudgetError::Exceeded { requested: amount, remaining });
        }

        if let Some(daily_limit) = record.daily_limit {
            let since = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
            let used_today = self.relational.usage_sum_since(tenant_id, user_id, since).await?;
            if used_today + amount > daily_limit {
                return Err(BudgetError::DailyCapExceeded);
            }
        }

        if let Some(monthly_limit) = record.monthly_limit {
            let now = Utc::now();
            let since = now
                .date_naive()
                .with_day(1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc();
            let used_month = self.relational.usage_sum_since(tenant_id, user_id, since).await?;
            if used_month + amount > monthly_limit {
                return Err(BudgetError::MonthlyCapExceeded);
            }
        }

        let reservation_key = format!("budget_reservation:{tenant_id}:{user_id}:{request_id}");
        self.kv
            .reserve(&reservation_key, amount.to_string().as_bytes(), self.config.reservation_ttl)
            .await?;

        self.cached_remaining.insert(key, remaining - amount);
        Ok(())
    }

    /// Finalize spend at the actual cost: delete the reservation, insert an
    /// idempotent `UsageRecord`, update `used_budget`, and run alerts.
    #[allow(clippy::too_many_arguments)]
    pub async fn settle(
        &self,
        tenant_id: &str,
        user_id: &str,
        request_id: &str,
        model_name: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        actual_cost: Decimal,
    ) -> Result<(), BudgetError> {
        if !self.config.cost_tracking_enabled {
            return Ok(());
        }

        let key = (tenant_id.to_string(), user_id.to_string());
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let reservation_key = format!("budget_reservation:{tenant_id}:{user_id}:{request_id}");
        self.kv.delete(&reservation_key).await?;

        let record = UsageRecord {
            request_id: request_id.to_string(),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            model_name: model_name.to_string(),
            prompt_tokens,
            completion_tokens,
            cost_usd: actual_cost,
            created_at: Utc::now(),
        };
        let inserted = self.relational.insert_usage_if_absent(&record).await?;
        if !inserted {
            return Ok(());
        }

        let mut budget = self.load_record(tenant_id, user_id).await?;
        budget.used_budget += actual_cost;
        self.relational.upsert_budget(&budget).await?;
        self.cached_remaining.insert(key, budget.remaining());

        self.maybe_alert(&budget).await?;
        Ok(())
    }

    /// Release a held reservation without spending it. Deleting an absent
    /// reservation is success, not an error (spec.md §4.5 idempotence law).
    pub async fn release(&self, tenant_id: &str, user_id: &str, request_id: &str, amount: Decimal) -> Result<(), BudgetError> {
        let key = (tenant_id.to_string(), user_id.to_string());
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let reservation_key = format!("budget_reservation:{tenant_id}:{user_id}:{request_id}");
        let was_present = self.kv.delete(&reservation_key).await?;
        if was_present {
            self.cached_remaining
                .entry(key)
                .and_modify(|r| *r += amount)
                .or_insert(amount);
        }
        Ok(())
    }

    async fn maybe_alert(&self, record: &BudgetRecord) -> Result<(), BudgetError> {
        let utilization = record.utilization();
        let Some(threshold) = alerts::highest_crossed(utilization) else {
            return Ok(());
        };

        let window_start = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let threshold_bits = threshold.to_bits();
        let already_fired = self
            .relational
            .alert_already_fired(&record.tenant_id, &record.user_id, threshold_bits, window_start)
            .await?;
        if already_fired {
            return Ok(());
        }

        let alert = alerts::build_alert(&record.tenant_id, &record.user_id, threshold, utilization);
        tracing::warn!(
            tenant_id = %record.tenant_id,
            user_id = %record.user_id,
            threshold,
            utilization,
            level = ?alert.level,
            "budget threshold crossed"
        );
        self.relational.record_alert(&alert).await?;
        Ok(())
    }

    /// Spawn the three maintenance loops (spec.md §4.5): 5-minute cache
    /// reconciliation, periodic usage aggregation, daily/monthly reset-check.
    ///
    /// The reset and aggregation baselines are seeded to "now" before the
    /// loops start, so the first tick after startup never re-fires a reset
    /// or re-aggregates the whole ledger's history.
    pub fn spawn_maintenance(self: &Arc<Self>) {
        {
            let today = Utc::now().date_naive();
            *self.last_daily_reset.lock().unwrap() = Some(today);
            *self.last_monthly_reset.lock().unwrap() = Some((today.year(), today.month()));
            *self.last_aggregated_at.lock().unwrap() = Utc::now();
        }

        let this = Arc::clone(self);
        let token = this.shutdown.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(this.config.cache_reload_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        this.cached_remaining.clear();
                    }
                }
            }
        });

        let this = Arc::clone(self);
        let token = this.shutdown.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(this.config.usage_aggregation_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        let since = *this.last_aggregated_at.lock().unwrap();
                        let now = Utc::now();
                        match this.relational.aggregate_usage(since).await {
                            Ok(count) => {
                                tracing::debug!(count, since = %since, "usage aggregation pass");
                                *this.last_aggregated_at.lock().unwrap() = now;
                            }
                            Err(e) => tracing::warn!(error = %e, "usage aggregation pass failed"),
                        }
                    }
                }
            }
        });

        let this = Arc::clone(self);
        let token = this.shutdown.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(this.config.reset_check_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        let today = Utc::now().date_naive();

                        let due_daily = {
                            let mut last = this.last_daily_reset.lock().unwrap();
                            let due = *last != Some(today);
                            *last = Some(today);
                            due
                        };
                        if due_daily {
                            match this.relational.reset_daily_budgets().await {
                                Ok(count) => {
                                    tracing::info!(count, "daily budgets reset");
                                    this.cached_remaining.clear();
                                }
                                Err(e) => tracing::warn!(error = %e, "daily budget reset failed"),
                            }
                        }

                        let month_key = (today.year(), today.month());
                        let due_monthly = {
                            let mut last = this.last_monthly_reset.lock().unwrap();
                            let due = *last != Some(month_key);
                            *last = Some(month_key);
                            due
                        };
                        if due_monthly {
                            match this.relational.reset_monthly_budgets().await {
                                Ok(count) => {
                                    tracing::info!(count, "monthly budgets reset");
                                    this.cached_remaining.clear();
                                }
                                Err(e) => tracing::warn!(error = %e, "monthly budget reset failed"),
                            }
                        }
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{KVResult, RelationalResult};
    use crate::value_objects::{BudgetAlert, MemoryEntry};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashMap;

    #[derive(Default)]
    struct StubRelational {
        budgets: Mutex<HashMap<(String, String), BudgetRecord>>,
        usage: Mutex<Vec<UsageRecord>>,
    }

    #[async_trait]
    impl RelationalPort for StubRelational {
        async fn get_budget(&self, tenant_id: &str, user_id: &str) -> RelationalResult<BudgetRecord> {
            self.budgets
                .lock()
                .unwrap()
                .get(&(tenant_id.to_string(), user_id.to_string()))
                .cloned()
                .ok_or_else(|| RelationalError::NotFound("budget".into()))
        }
        async fn upsert_budget(&self, record: &BudgetRecord) -> RelationalResult<()> {
            self.budgets
                .lock()
                .unwrap()
                .insert((record.tenant_id.clone(), record.user_id.clone()), record.clone());
            Ok(())
        }
        async fn insert_usage_if_absent(&self, record: &UsageRecord) -> RelationalResult<bool> {
            let mut usage = self.usage.lock().unwrap();
            if usage.iter().any(|u| u.request_id == record.request_id) {
                return Ok(false);
            }
            usage.push(record.clone());
            Ok(true)
        }
        async fn usage_sum_since(&self, _tenant_id: &str, _user_id: &str, _since: DateTime<Utc>) -> RelationalResult<Decimal> {
            Ok(Decimal::ZERO)
        }
        async fn record_alert(&self, _alert: &BudgetAlert) -> RelationalResult<()> {
            Ok(())
        }
        async fn alert_already_fired(&self, _tenant_id: &str, _user_id: &str, _threshold_bits: u64, _window_start: DateTime<Utc>) -> RelationalResult<bool> {
            Ok(false)
        }
        async fn load_memories(&self, _user_id: &str, _session_id: &str, _limit: usize) -> RelationalResult<Vec<MemoryEntry>> {
            Ok(vec![])
        }
        async fn store_memory(&self, _entry: &MemoryEntry) -> RelationalResult<()> {
            Ok(())
        }
        async fn prune_memories(&self, _older_than: DateTime<Utc>) -> RelationalResult<usize> {
            Ok(0)
        }
        async fn reset_daily_budgets(&self) -> RelationalResult<usize> {
            let mut budgets = self.budgets.lock().unwrap();
            let n = budgets.len();
            for record in budgets.values_mut() {
                record.used_budget = Decimal::ZERO;
            }
            Ok(n)
        }
        async fn reset_monthly_budgets(&self) -> RelationalResult<usize> {
            self.reset_daily_budgets().await
        }
        async fn aggregate_usage(&self, since: DateTime<Utc>) -> RelationalResult<usize> {
            Ok(self.usage.lock().unwrap().iter().filter(|u| u.created_at >= since).count())
        }
    }

    #[derive(Default)]
    struct StubKv(Mutex<HashMap<String, Vec<u8>>>);

    #[async_trait]
    impl EphemeralKVPort for StubKv {
        async fn reserve(&self, key: &str, value: &[u8], _ttl: Duration) -> KVResult<bool> {
            let mut map = self.0.lock().unwrap();
            if map.contains_key(key) {
                return Ok(false);
            }
            map.insert(key.to_string(), value.to_vec());
            Ok(true)
        }
        async fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }
        async fn delete(&self, key: &str) -> KVResult<bool> {
            Ok(self.0.lock().unwrap().remove(key).is_some())
        }
        async fn incr_with_ttl(&self, _key: &str, _ttl: Duration) -> KVResult<u64> {
            Ok(1)
        }
    }

    fn manager() -> BudgetManager {
        BudgetManager::new(BudgetConfig::default(), Arc::new(StubRelational::default()), Arc::new(StubKv::default()))
    }

    #[tokio::test]
    async fn reserve_rejects_amount_beyond_remaining() {
        let mgr = manager();
        let result = mgr.reserve("t", "u", "r1", Decimal::from(1_000)).await;
        assert!(matches!(result, Err(BudgetError::Exceeded { .. })));
    }

    #[tokio::test]
    async fn reserve_then_release_is_idempotent_on_second_release() {
        let mgr = manager();
        mgr.reserve("t", "u", "r1", Decimal::from(10)).await.unwrap();
        mgr.release("t", "u", "r1", Decimal::from(10)).await.unwrap();
        mgr.release("t", "u", "r1", Decimal::from(10)).await.unwrap();
    }

    #[tokio::test]
    async fn settle_is_idempotent_on_duplicate_request_id() {
        let mgr = manager();
        mgr.reserve("t", "u", "r1", Decimal::from(10)).await.unwrap();
        mgr.settle("t", "u", "r1", "gpt-4o", 100, 50, Decimal::from(5)).await.unwrap();
        mgr.settle("t", "u", "r1", "gpt-4o", 100, 50, Decimal::from(5)).await.unwrap();
        let record = mgr.load_record("t", "u").await.unwrap();
        assert_eq!(record.used_budget, Decimal::from(5));
    }

    #[tokio::test]
    async fn reset_daily_budgets_zeroes_used_budget() {
        let mgr = manager();
        mgr.reserve("t", "u", "r1", Decimal::from(10)).await.unwrap();
        mgr.settle("t", "u", "r1", "gpt-4o", 100, 50, Decimal::from(5)).await.unwrap();
        assert_eq!(mgr.load_record("t", "u").await.unwrap().used_budget, Decimal::from(5));

        let reset_count = mgr.relational.reset_daily_budgets().await.unwrap();
        assert_eq!(reset_count, 1);
        assert_eq!(mgr.load_record("t", "u").await.unwrap().used_budget, Decimal::ZERO);
    }

    #[tokio::test]
    async fn aggregate_usage_counts_records_since_cutoff() {
        let mgr = manager();
        mgr.reserve("t", "u", "r1", Decimal::from(10)).await.unwrap();
        mgr.settle("t", "u", "r1", "gpt-4o", 100, 50, Decimal::from(5)).await.unwrap();

        let far_past = Utc::now() - chrono::Duration::days(1);
        let count = mgr.relational.aggregate_usage(far_past).await.unwrap();
        assert_eq!(count, 1);

        let far_future = Utc::now() + chrono::Duration::days(1);
        let count = mgr.relational.aggregate_usage(far_future).await.unwrap();
        assert_eq!(count, 0);
    }
}
