// Copyright (c) 2025 - Cowboy AI, LLC.

//! Conversation memory retrieval: fetch-or-cache up to 50 entries per
//! `(user, session)`, sorted by `(importance desc, timestamp desc)` and
//! split at the 0.7 importance threshold into important facts and recent
//! interactions (each capped at top 10), per
//! `original_source/core/context_engine.py`.

use crate::ports::RelationalPort;
use crate::value_objects::MemoryEntry;
use moka::sync::Cache;
use std::sync::Arc;

use super::ContextError;

const FETCH_LIMIT: usize = 50;
const IMPORTANCE_THRESHOLD: f32 = 0.7;
const SECTION_CAP: usize = 10;

pub struct MemoryStore {
    relational: Arc<dyn RelationalPort>,
    cache: Cache<(String, String), Arc<Vec<MemoryEntry>>>,
}

impl MemoryStore {
    pub fn new(relational: Arc<dyn RelationalPort>) -> Self {
        Self {
            relational,
            cache: Cache::new(10_000),
        }
    }

    /// Important facts first, then recent interactions, each capped at 10.
    pub async fn relevant(&self, user_id: &str, session_id: &str) -> Result<Vec<MemoryEntry>, ContextError> {
        let key = (user_id.to_string(), session_id.to_string());
        let entries = match self.cache.get(&key) {
            Some(cached) => cached,
            None => {
                let mut fetched = self
                    .relational
                    .load_memories(user_id, session_id, FETCH_LIMIT)
                    .await?;
                fetched.sort_by(|a, b| {
                    b.importance
                        .partial_cmp(&a.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.created_at.cmp(&a.created_at))
                });
                let wrapped = Arc::new(fetched);
                self.cache.insert(key, wrapped.clone());
                wrapped
            }
        };

        let (important, recent): (Vec<_>, Vec<_>) = entries
            .iter()
            .cloned()
            .partition(|e| e.importance > IMPORTANCE_THRESHOLD);

        let mut result: Vec<MemoryEntry> = important.into_iter().take(SECTION_CAP).collect();
        result.extend(recent.into_iter().take(SECTION_CAP));
        Ok(result)
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::RelationalResult;
    use crate::value_objects::{BudgetAlert, BudgetRecord, UsageRecord};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    struct StubRelational(Mutex<Vec<MemoryEntry>>);

    #[async_trait]
    impl RelationalPort for StubRelational {
        async fn get_budget(&self, _tenant_id: &str, _user_id: &str) -> RelationalResult<BudgetRecord> {
            unimplemented!()
        }
        async fn upsert_budget(&self, _record: &BudgetRecord) -> RelationalResult<()> {
            unimplemented!()
        }
        async fn insert_usage_if_absent(&self, _record: &UsageRecord) -> RelationalResult<bool> {
            unimplemented!()
        }
        async fn usage_sum_since(
            &self,
            _tenant_id: &str,
            _user_id: &str,
            _since: DateTime<Utc>,
        ) -> RelationalResult<Decimal> {
            unimplemented!()
        }
        async fn record_alert(&self, _alert: &BudgetAlert) -> RelationalResult<()> {
            unimplemented!()
        }
        async fn alert_already_fired(
            &self,
            _tenant_id: &str,
            _user_id: &str,
            _threshold_bits: u64,
            _window_start: DateTime<Utc>,
        ) -> RelationalResult<bool> {
            unimplemented!()
        }
        async fn load_memories(
            &self,
            _user_id: &str,
            _session_id: &str,
            _limit: usize,
        ) -> RelationalResult<Vec<MemoryEntry>> {
            Ok(self.0.lock().unwrap().clone())
        }
        async fn store_memory(&self, entry: &MemoryEntry) -> RelationalResult<()> {
            self.0.lock().unwrap().push(entry.clone());
            Ok(())
        }
        async fn prune_memories(&self, _older_than: DateTime<Utc>) -> RelationalResult<usize> {
            Ok(0)
        }
        async fn reset_daily_budgets(&self) -> RelationalResult<usize> {
            unimplemented!()
        }
        async fn reset_monthly_budgets(&self) -> RelationalResult<usize> {
            unimplemented!()
        }
        async fn aggregate_usage(&self, _since: DateTime<Utc>) -> RelationalResult<usize> {
            unimplemented!()
        }
    }

    fn entry(content: &str, importance: f32) -> MemoryEntry {
        MemoryEntry {
            user_id: "u".into(),
            session_id: "s".into(),
            content: content.into(),
            importance,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn relevant_puts_important_facts_before_recent() {
        let entries = vec![entry("trivial", 0.2), entry("crucial preference", 0.9)];
        let store = MemoryStore::new(Arc::new(StubRelational(Mutex::new(entries))));
        let result = store.relevant("u", "s").await.unwrap();
        assert_eq!(result[0].content, "crucial preference");
    }

    #[tokio::test]
    async fn relevant_treats_threshold_boundary_as_not_important() {
        let entries = vec![entry("right at the line", 0.7), entry("above the line", 0.71)];
        let store = MemoryStore::new(Arc::new(StubRelational(Mutex::new(entries))));
        let result = store.relevant("u", "s").await.unwrap();
        assert_eq!(result[0].content, "above the line");
        assert_eq!(result[1].content, "right at the line");
    }

    #[tokio::test]
    async fn relevant_caches_between_calls() {
        let store = MemoryStore::new(Arc::new(StubRelational(Mutex::new(vec![entry("a", 0.5)]))));
        let first = store.relevant("u", "s").await.unwrap();
        let second = store.relevant("u", "s").await.unwrap();
        assert_eq!(first, second);
    }
}
