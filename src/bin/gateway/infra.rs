// Copyright (c) 2025 - Cowboy AI, LLC.

//! In-process port implementations wiring the gateway binary for local
//! development, grounded on the teacher's `InMemorySnapshotStore`: a
//! minimal, non-durable stand-in for the relational/KV/vector backends a
//! real deployment supplies (spec.md §1 explicitly leaves those external).
//! None of this is exported from the library - it exists only to make
//! `src/bin/gateway` runnable without external infrastructure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use llm_gateway::ports::{
    EmbedderError, EmbedderPort, EmbedderResult, EphemeralKVPort, KVError, KVResult,
    RelationalError, RelationalPort, RelationalResult, VectorError, VectorFilter, VectorPort,
    VectorResult,
};
use llm_gateway::value_objects::{BudgetAlert, BudgetRecord, KnowledgeChunk, MemoryEntry, UsageRecord};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Mutex-guarded in-memory ledger, budget and memory store.
#[derive(Default)]
pub struct InMemoryRelationalStore {
    budgets: Mutex<HashMap<(String, String), BudgetRecord>>,
    usage: Mutex<Vec<UsageRecord>>,
    memories: Mutex<Vec<MemoryEntry>>,
    alerts: Mutex<Vec<BudgetAlert>>,
    fired_alerts: Mutex<HashSet<(String, String, u64, DateTime<Utc>)>>,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationalPort for InMemoryRelationalStore {
    async fn get_budget(&self, tenant_id: &str, user_id: &str) -> RelationalResult<BudgetRecord> {
        self.budgets
            .lock()
            .unwrap()
            .get(&(tenant_id.to_string(), user_id.to_string()))
            .cloned()
            .ok_or_else(|| RelationalError::NotFound(format!("budget {tenant_id}/{user_id}")))
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

    async fn usage_sum_since(
        &self,
        tenant_id: &str,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> RelationalResult<Decimal> {
        let sum = self
            .usage
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.tenant_id == tenant_id && u.user_id == user_id && u.created_at >= since)
            .map(|u| u.cost_usd)
            .sum();
        Ok(sum)
    }

    async fn record_alert(&self, alert: &BudgetAlert) -> RelationalResult<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn alert_already_fired(
        &self,
        tenant_id: &str,
        user_id: &str,
        threshold_bits: u64,
        window_start: DateTime<Utc>,
    ) -> RelationalResult<bool> {
        let key = (tenant_id.to_string(), user_id.to_string(), threshold_bits, window_start);
        let mut fired = self.fired_alerts.lock().unwrap();
        if fired.contains(&key) {
            return Ok(true);
        }
        fired.insert(key);
        Ok(false)
    }

    async fn load_memories(
        &self,
        user_id: &str,
        session_id: &str,
        limit: usize,
    ) -> RelationalResult<Vec<MemoryEntry>> {
        Ok(self
            .memories
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.user_id == user_id && m.session_id == session_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn store_memory(&self, entry: &MemoryEntry) -> RelationalResult<()> {
        self.memories.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn prune_memories(&self, older_than: DateTime<Utc>) -> RelationalResult<usize> {
        let mut memories = self.memories.lock().unwrap();
        let before = memories.len();
        memories.retain(|m| m.created_at >= older_than);
        Ok(before - memories.len())
    }

    async fn reset_daily_budgets(&self) -> RelationalResult<usize> {
        let mut budgets = self.budgets.lock().unwrap();
        let mut count = 0;
        for record in budgets.values_mut() {
            if record.daily_limit.is_some() {
                record.used_budget = Decimal::ZERO;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn reset_monthly_budgets(&self) -> RelationalResult<usize> {
        let mut budgets = self.budgets.lock().unwrap();
        let mut count = 0;
        for record in budgets.values_mut() {
            if record.monthly_limit.is_some() {
                record.used_budget = Decimal::ZERO;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn aggregate_usage(&self, since: DateTime<Utc>) -> RelationalResult<usize> {
        Ok(self.usage.lock().unwrap().iter().filter(|u| u.created_at >= since).count())
    }
}

struct KvEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// TTL'd in-memory key/value store standing in for Redis.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, KvEntry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EphemeralKVPort for InMemoryKvStore {
    async fn reserve(&self, key: &str, value: &[u8], ttl: Duration) -> KVResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(key) {
            if existing.expires_at > Instant::now() {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            KvEntry { value: value.to_vec(), expires_at: Instant::now() + ttl },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> KVResult<bool> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> KVResult<u64> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        let current = entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .and_then(|e| std::str::from_utf8(&e.value).ok()?.parse::<u64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        entries.insert(
            key.to_string(),
            KvEntry { value: next.to_string().into_bytes(), expires_at: now + ttl },
        );
        Ok(next)
    }
}

/// Linear-scan cosine-similarity vector store standing in for a real vector
/// database (out of scope per spec.md §1).
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: Mutex<Vec<(Vec<f32>, KnowledgeChunk)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorPort for InMemoryVectorStore {
    async fn similarity_search(
        &self,
        embedding: &[f32],
        top_k: usize,
        min_score: f32,
        _filter: VectorFilter,
    ) -> VectorResult<Vec<KnowledgeChunk>> {
        if embedding.is_empty() {
            return Err(VectorError::DimensionMismatch { expected: 1, actual: 0 });
        }
        let entries = self.entries.lock().unwrap();
        let mut scored: Vec<KnowledgeChunk> = entries
            .iter()
            .map(|(vec, chunk)| {
                let mut chunk = chunk.clone();
                chunk.score = cosine_similarity(embedding, vec);
                chunk
            })
            .filter(|chunk| chunk.score >= min_score)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn upsert(&self, incoming: Vec<(Vec<f32>, KnowledgeChunk)>) -> VectorResult<()> {
        self.entries.lock().unwrap().extend(incoming);
        Ok(())
    }
}

/// Deterministic hashing embedder: folds each word into a fixed-width
/// vector by character-code hashing. Not a real embedding model - a local
/// stand-in so `ContextEngine` can be exercised without a network call.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }
}

#[async_trait]
impl EmbedderPort for HashEmbedder {
    async fn embed(&self, text: &str) -> EmbedderResult<Vec<f32>> {
        if text.is_empty() {
            return Err(EmbedderError::Generation("cannot embed empty text".into()));
        }
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.split_whitespace() {
            let mut hash: u64 = 1469598103934665603;
            for byte in word.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash as usize) % self.dimensions;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
