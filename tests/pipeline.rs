// Copyright (c) 2025 - Cowboy AI, LLC.

//! End-to-end coverage of `ServingPipeline::complete`/`stream` driven
//! through `MockProvider` plus small in-memory port stubs, exercising the
//! reserve → execute → settle/release discipline spec.md §4.1/§4.4/§8
//! describe at the module boundary rather than unit-by-unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use llm_gateway::budget::{BudgetConfig, BudgetError, BudgetManager};
use llm_gateway::capabilities::RuntimeCapabilities;
use llm_gateway::context_engine::{ContextConfig, ContextEngine};
use llm_gateway::pipeline::{PipelineError, ServingPipeline};
use llm_gateway::ports::{
    EmbedderError, EmbedderPort, EmbedderResult, EphemeralKVPort, KVError, KVResult,
    ProviderChatStream, ProviderError, ProviderPort, ProviderResult, RelationalError,
    RelationalPort, RelationalResult, VectorError, VectorFilter, VectorPort, VectorResult,
};
use llm_gateway::providers::MockProvider;
use llm_gateway::router::{Router, RouterConfig, RouterError};
use llm_gateway::value_objects::{
    BudgetAlert, BudgetRecord, ChatRequest, ChatResponse, ContextMessage, KnowledgeChunk,
    MemoryEntry, ModelDescriptor, ProviderType, RequestIdentity, UsageRecord,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mutex-guarded relational stand-in, mirroring `src/bin/gateway/infra.rs`'s
/// `InMemoryRelationalStore` but kept local to this test binary, which has
/// no access to the gateway binary's private module.
#[derive(Default)]
struct TestRelational {
    budgets: Mutex<HashMap<(String, String), BudgetRecord>>,
    usage: Mutex<Vec<UsageRecord>>,
    memories: Mutex<Vec<MemoryEntry>>,
    alerts: Mutex<Vec<BudgetAlert>>,
}

#[async_trait]
impl RelationalPort for TestRelational {
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
        Ok(self
            .usage
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.tenant_id == tenant_id && u.user_id == user_id && u.created_at >= since)
            .map(|u| u.cost_usd)
            .sum())
    }

    async fn record_alert(&self, alert: &BudgetAlert) -> RelationalResult<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn alert_already_fired(
        &self,
        _tenant_id: &str,
        _user_id: &str,
        _threshold_bits: u64,
        _window_start: DateTime<Utc>,
    ) -> RelationalResult<bool> {
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
struct TestKv(Mutex<HashMap<String, Vec<u8>>>);

#[async_trait]
impl EphemeralKVPort for TestKv {
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
        Err(KVError::Backend("not used".into()))
    }
}

/// Returns its fixed chunks regardless of query embedding, mirroring the
/// stub used in `src/context_engine/knowledge.rs`'s own unit tests.
struct TestVector(Vec<KnowledgeChunk>);

#[async_trait]
impl VectorPort for TestVector {
    async fn similarity_search(
        &self,
        embedding: &[f32],
        _top_k: usize,
        _min_score: f32,
        _filter: VectorFilter,
    ) -> VectorResult<Vec<KnowledgeChunk>> {
        if embedding.is_empty() {
            return Err(VectorError::DimensionMismatch { expected: 1, actual: 0 });
        }
        Ok(self.0.clone())
    }
    async fn upsert(&self, _entries: Vec<(Vec<f32>, KnowledgeChunk)>) -> VectorResult<()> {
        Ok(())
    }
}

struct TestEmbedder;

#[async_trait]
impl EmbedderPort for TestEmbedder {
    async fn embed(&self, _text: &str) -> EmbedderResult<Vec<f32>> {
        if _text.is_empty() {
            return Err(EmbedderError::Generation("empty".into()));
        }
        Ok(vec![0.1, 0.2, 0.3])
    }
    fn dimensions(&self) -> usize {
        3
    }
}

fn no_knowledge_context_engine(relational: Arc<dyn RelationalPort>) -> Arc<ContextEngine> {
    Arc::new(ContextEngine::new(
        ContextConfig::default(),
        Arc::new(TestVector(vec![])),
        Arc::new(TestEmbedder),
        relational,
    ))
}

/// Fails its first `remaining_failures` calls with a transient transport
/// error, then delegates to an inner `MockProvider`. Lets tests drive the
/// router's circuit breaker without touching real network providers.
struct FlakyProvider {
    remaining_failures: AtomicUsize,
    inner: MockProvider,
}

impl FlakyProvider {
    fn new(failures: usize) -> Self {
        Self { remaining_failures: AtomicUsize::new(failures), inner: MockProvider::new() }
    }

    fn stop_failing(&self) {
        self.remaining_failures.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderPort for FlakyProvider {
    async fn complete(&self, request: &ChatRequest, model_name: &str) -> ProviderResult<ChatResponse> {
        if self.remaining_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n > 0 {
                Some(n - 1)
            } else {
                None
            }
        }).is_ok() {
            return Err(ProviderError::Transient("simulated upstream failure".into()));
        }
        self.inner.complete(request, model_name).await
    }

    async fn stream_complete(
        &self,
        request: &ChatRequest,
        model_name: &str,
    ) -> ProviderResult<ProviderChatStream> {
        self.inner.stream_complete(request, model_name).await
    }

    async fn list_models(&self) -> ProviderResult<Vec<ModelDescriptor>> {
        self.inner.list_models().await
    }

    async fn health_check(&self) -> ProviderResult<()> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "flaky"
    }
}

fn descriptor(model_name: &str, prompt_cost: &str, completion_cost: &str) -> ModelDescriptor {
    ModelDescriptor {
        provider: ProviderType::Mock,
        model_name: model_name.to_string(),
        capabilities: RuntimeCapabilities::BASIC_CHAT,
        max_context_length: 8_192,
        max_output_tokens: 4_096,
        cost_per_1k_prompt_tokens: Decimal::from_str(prompt_cost).unwrap(),
        cost_per_1k_completion_tokens: Decimal::from_str(completion_cost).unwrap(),
        max_concurrency: 10,
        capability_score: 0.5,
    }
}

fn request(tenant: &str, user: &str, request_id: &str, text: &str) -> ChatRequest {
    ChatRequest {
        identity: RequestIdentity {
            tenant_id: tenant.to_string(),
            user_id: user.to_string(),
            request_id: request_id.to_string(),
            ..Default::default()
        },
        messages: vec![ContextMessage::user(text)],
        max_tokens: Some(10),
        ..Default::default()
    }
}

fn budget_manager(relational: Arc<dyn RelationalPort>) -> Arc<BudgetManager> {
    Arc::new(BudgetManager::new(BudgetConfig::default(), relational, Arc::new(TestKv::default())))
}

#[tokio::test]
async fn happy_path_reserves_executes_and_settles() {
    let relational: Arc<dyn RelationalPort> = Arc::new(TestRelational::default());
    let budget = budget_manager(relational.clone());
    let router = Arc::new(
        Router::new(RouterConfig::default()).with_provider(ProviderType::Mock, Arc::new(MockProvider::new())),
    );
    let d = descriptor("mock-model", "1", "1");
    router.upsert_model(d.clone());
    let context_engine = no_knowledge_context_engine(relational.clone());

    let pipeline = ServingPipeline::new(router, context_engine, budget.clone());
    let response = pipeline
        .complete(request("t1", "u1", "r1", "hello there"))
        .await
        .expect("happy path should succeed");

    assert!(response.choices[0].message.content.contains("hello there"));

    let record = relational.get_budget("t1", "u1").await.unwrap();
    assert!(record.used_budget > Decimal::ZERO, "settle should have recorded nonzero spend");
}

#[tokio::test]
async fn budget_rejection_blocks_before_provider_call() {
    let relational: Arc<dyn RelationalPort> = Arc::new(TestRelational::default());
    let budget = budget_manager(relational.clone());
    let router = Arc::new(
        Router::new(RouterConfig::default()).with_provider(ProviderType::Mock, Arc::new(MockProvider::new())),
    );
    // Expensive enough that the default $100 budget cannot cover one request.
    let d = descriptor("mock-model", "1000", "1000");
    router.upsert_model(d);
    let context_engine = no_knowledge_context_engine(relational.clone());

    let pipeline = ServingPipeline::new(router, context_engine, budget);
    let err = pipeline
        .complete(request("t1", "u1", "r1", "hello there"))
        .await
        .expect_err("estimate should exceed the standing budget");

    assert!(matches!(err, PipelineError::Budget(BudgetError::Exceeded { .. })));
    assert_eq!(err.status_code(), 402);

    // No reservation should have been left dangling, nor any usage recorded.
    let record = relational.get_budget("t1", "u1").await.unwrap();
    assert_eq!(record.used_budget, Decimal::ZERO);
}

#[tokio::test]
async fn release_on_failure_leaves_no_settlement_and_restores_budget() {
    let relational: Arc<dyn RelationalPort> = Arc::new(TestRelational::default());
    let budget = budget_manager(relational.clone());
    let provider = Arc::new(FlakyProvider::new(1));
    let router = Arc::new(Router::new(RouterConfig::default()).with_provider(ProviderType::Mock, provider));
    let d = descriptor("mock-model", "10", "10");
    router.upsert_model(d.clone());
    let context_engine = no_knowledge_context_engine(relational.clone());

    let pipeline = ServingPipeline::new(router, context_engine, budget);

    let err = pipeline
        .complete(request("t1", "u1", "r1", "this will fail"))
        .await
        .expect_err("flaky provider's first call always fails");
    assert!(matches!(err, PipelineError::Provider(ProviderError::Transient(_))));

    let record = relational.get_budget("t1", "u1").await.unwrap();
    assert_eq!(record.used_budget, Decimal::ZERO, "a released reservation must never be settled");

    // The reservation's hold should have been released, so an equally-sized
    // follow-up request against the same ledger succeeds immediately.
    let est = record.total_budget - record.used_budget;
    assert_eq!(est, record.total_budget, "full budget should be available again after release");
}

#[tokio::test]
async fn circuit_trips_after_repeated_failures_and_recovers_after_reset_window() {
    let relational: Arc<dyn RelationalPort> = Arc::new(TestRelational::default());
    let budget = budget_manager(relational.clone());
    let provider = Arc::new(FlakyProvider::new(11));

    let mut router_config = RouterConfig::default();
    router_config.circuit_reset_after = Duration::from_millis(1);
    router_config.circuit_reset_interval = Duration::from_millis(20);
    let router = Arc::new(Router::new(router_config).with_provider(ProviderType::Mock, provider.clone()));
    let d = descriptor("mock-model", "0", "0");
    router.upsert_model(d.clone());
    let context_engine = no_knowledge_context_engine(relational.clone());

    let pipeline = ServingPipeline::new(router.clone(), context_engine, budget);

    for i in 0..11 {
        let result = pipeline.complete(request("t1", "u1", &format!("r{i}"), "ping")).await;
        assert!(result.is_err(), "each of the first 11 calls should fail via the flaky provider");
    }

    let tripped = pipeline.complete(request("t1", "u1", "r-tripped", "ping")).await;
    assert!(
        matches!(tripped, Err(PipelineError::Router(RouterError::CircuitOpen))),
        "11 failures at 100% failure rate should trip the breaker before the provider is called"
    );
    assert_eq!(tripped.unwrap_err().status_code(), 503);

    provider.stop_failing();
    router.spawn_maintenance();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let recovered = pipeline.complete(request("t1", "u1", "r-recovered", "ping")).await;
    assert!(recovered.is_ok(), "circuit should auto-close once the reset window has elapsed");

    router.shutdown();
}

#[tokio::test]
async fn context_compression_caps_injected_knowledge_section() {
    let relational: Arc<dyn RelationalPort> = Arc::new(TestRelational::default());
    let budget = budget_manager(relational.clone());
    let router = Arc::new(
        Router::new(RouterConfig::default()).with_provider(ProviderType::Mock, Arc::new(MockProvider::new())),
    );
    let d = descriptor("mock-model", "0", "0");
    router.upsert_model(d.clone());

    let mut context_config = ContextConfig::default();
    context_config.max_context_length = 50;
    context_config.compression_threshold = 0.5;
    context_config.knowledge_budget_tokens = 10_000;
    context_config.memory_retrieval_enabled = false;

    let huge_chunk = KnowledgeChunk {
        source: "docs/policy.md".to_string(),
        content: "x".repeat(500),
        score: 0.95,
    };
    let context_engine = Arc::new(ContextEngine::new(
        context_config,
        Arc::new(TestVector(vec![huge_chunk])),
        Arc::new(TestEmbedder),
        relational.clone(),
    ));

    let mut req = request("t1", "u1", "r1", "what's the refund policy?");
    req.context_id = Some("ctx-1".to_string());

    let pipeline = ServingPipeline::new(router, context_engine, budget);
    let response = pipeline.complete(req).await.expect("compression should not fail the request");

    let echoed = &response.choices[0].message.content;
    assert!(echoed.contains("Relevant context:"), "knowledge should still be injected");
    assert!(
        echoed.len() < 300,
        "compression should have shrunk the 500-char knowledge block substantially, got {} chars",
        echoed.len()
    );
}

#[tokio::test]
async fn stream_ends_with_usage_chunk_then_done_sentinel() {
    let relational: Arc<dyn RelationalPort> = Arc::new(TestRelational::default());
    let budget = budget_manager(relational.clone());
    let router = Arc::new(
        Router::new(RouterConfig::default()).with_provider(ProviderType::Mock, Arc::new(MockProvider::new())),
    );
    let d = descriptor("mock-model", "1", "1");
    router.upsert_model(d);
    let context_engine = no_knowledge_context_engine(relational.clone());

    let pipeline = ServingPipeline::new(router, context_engine, budget);
    let mut req = request("t1", "u1", "r1", "stream this please");
    req.stream = true;

    let mut stream = pipeline.stream(req).await.expect("stream should start");
    let mut chunks = Vec::new();
    while let Some(item) = stream.next().await {
        chunks.push(item.expect("no chunk should error in the happy path"));
    }

    let last = chunks.last().expect("stream should yield at least one chunk");
    assert_eq!(last.content, "[DONE]");
    assert!(last.is_final);

    let usage_chunk = &chunks[chunks.len() - 2];
    assert!(usage_chunk.content.contains("\"usage\""));
    assert!(usage_chunk.content.contains("\"cost_usd\""));

    let record = relational.get_budget("t1", "u1").await.unwrap();
    assert!(record.used_budget > Decimal::ZERO, "a completed stream should settle nonzero spend");
}
