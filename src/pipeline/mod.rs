// Copyright (c) 2025 - Cowboy AI, LLC.

//! Serving Pipeline: orchestrates model selection, context engineering,
//! budget enforcement and provider execution into the two calls exposed to
//! callers, `complete` and `stream`.
//!
//! Grounded structurally on `services/message_service.rs`'s
//! `AgentMessageService` (a thin orchestrator composing a capability router
//! and a provider adapter) and on `src/bin/agent-service.rs`'s
//! explicit-construction-over-global-state wiring.

use crate::budget::BudgetManager;
use crate::context_engine::ContextEngine;
use crate::ports::{ProviderError, ProviderResult};
use crate::router::{Router, RouterError};
use crate::value_objects::{ChatRequest, ChatResponse, FinishReason, StreamingChunk, TokenUsage};
use futures::{Stream, StreamExt};
use rust_decimal::Decimal;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Context(#[from] crate::context_engine::ContextError),

    #[error(transparent)]
    Budget(#[from] crate::budget::BudgetError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("per-request budget limit of {limit} exceeded by estimate {estimate}")]
    RequestBudgetExceeded { limit: Decimal, estimate: Decimal },
}

impl PipelineError {
    /// HTTP status a gateway surface should map this error to (spec.md
    /// §7's taxonomy-to-status table).
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Router(RouterError::CircuitOpen) => 503,
            PipelineError::Router(_) => 500,
            PipelineError::Context(_) => 500,
            PipelineError::Budget(crate::budget::BudgetError::Exceeded { .. }) => 402,
            PipelineError::Budget(crate::budget::BudgetError::DailyCapExceeded)
            | PipelineError::Budget(crate::budget::BudgetError::MonthlyCapExceeded) => 402,
            PipelineError::Budget(_) => 500,
            PipelineError::Provider(ProviderError::RateLimited { .. }) => 429,
            PipelineError::Provider(ProviderError::ClientError { status, .. }) => *status,
            PipelineError::Provider(ProviderError::ModelNotAvailable(_)) => 404,
            PipelineError::Provider(_) => 502,
            PipelineError::RequestBudgetExceeded { .. } => 402,
        }
    }
}

pub type PipelineChatStream = Pin<Box<dyn Stream<Item = ProviderResult<StreamingChunk>> + Send>>;

pub struct ServingPipeline {
    router: Arc<Router>,
    context_engine: Arc<ContextEngine>,
    budget: Arc<BudgetManager>,
}

impl ServingPipeline {
    pub fn new(router: Arc<Router>, context_engine: Arc<ContextEngine>, budget: Arc<BudgetManager>) -> Self {
        Self { router, context_engine, budget }
    }

    fn check_request_budget_limit(request: &ChatRequest, estimate_cost: Decimal) -> Result<(), PipelineError> {
        if let Some(limit_str) = &request.budget_limit {
            if let Ok(limit) = Decimal::from_str(limit_str) {
                if estimate_cost > limit {
                    return Err(PipelineError::RequestBudgetExceeded { limit, estimate: estimate_cost });
                }
            }
        }
        Ok(())
    }

    /// spec.md §4.1's seven-step algorithm: select → estimate → reserve →
    /// engineer+inject → execute → settle (or release on failure) →
    /// persist memory.
    pub async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, PipelineError> {
        let (model_key, descriptor) = self.router.select_optimal(&request)?;
        let tenant_id = request.identity.tenant_id.clone();
        let user_id = request.identity.user_id.clone();
        let request_id = request.identity.request_id.clone();

        let est = self.budget.estimate(&request, &descriptor);
        Self::check_request_budget_limit(&request, est.cost_usd)?;
        self.budget.reserve(&tenant_id, &user_id, &request_id, est.cost_usd).await?;

        let result = self.run_completion(&request, &model_key, &descriptor).await;

        match result {
            Ok(response) => {
                let actual_cost = crate::budget::cost_for_usage(response.usage, &descriptor);
                self.budget
                    .settle(
                        &tenant_id,
                        &user_id,
                        &request_id,
                        &descriptor.model_name,
                        response.usage.prompt_tokens,
                        response.usage.completion_tokens,
                        actual_cost,
                    )
                    .await?;

                if let Some(session_id) = &request.identity.session_id {
                    if let Some(choice) = response.choices.first() {
                        let _ = self
                            .context_engine
                            .store_conversation_memory(&user_id, session_id, &choice.message.content)
                            .await;
                    }
                }

                Ok(response)
            }
            Err(e) => {
                let _ = self.budget.release(&tenant_id, &user_id, &request_id, est.cost_usd).await;
                Err(e)
            }
        }
    }

    async fn run_completion(
        &self,
        request: &ChatRequest,
        model_key: &crate::value_objects::ModelKey,
        descriptor: &crate::value_objects::ModelDescriptor,
    ) -> Result<ChatResponse, PipelineError> {
        let mut provider_request = request.clone();
        if request.context_id.is_some() {
            let engineered = self.context_engine.engineer(request).await?;
            provider_request.messages = engineered.messages;
            if provider_request.tools.is_empty() && !engineered.suggested_tools.is_empty() {
                provider_request.tools = engineered.suggested_tools;
                provider_request.tool_choice = Some("auto".to_string());
            }
        }

        let provider = self
            .router
            .provider_for(model_key)
            .ok_or(RouterError::UnknownModel(model_key.1.clone()))?;

        let _guard = self.router.begin_request(model_key);
        let started = Instant::now();
        match provider.complete(&provider_request, &descriptor.model_name).await {
            Ok(response) => {
                self.router
                    .record_success(model_key, started.elapsed(), response.usage.total_tokens);
                Ok(response)
            }
            Err(e) => {
                self.router.record_failure(model_key);
                Err(e.into())
            }
        }
    }

    /// Same reserve/select/engineer prefix as `complete`, but drives a
    /// provider chunk stream: accumulates completion tokens at 4
    /// chars/token, settles on normal termination and emits a usage/cost
    /// chunk followed by `[DONE]`; releases and emits one error chunk on
    /// upstream failure, with no partial settlement (spec.md §4.4).
    pub async fn stream(&self, request: ChatRequest) -> Result<PipelineChatStream, PipelineError> {
        let (model_key, descriptor) = self.router.select_optimal(&request)?;
        let tenant_id = request.identity.tenant_id.clone();
        let user_id = request.identity.user_id.clone();
        let request_id = request.identity.request_id.clone();

        let est = self.budget.estimate(&request, &descriptor);
        Self::check_request_budget_limit(&request, est.cost_usd)?;
        self.budget.reserve(&tenant_id, &user_id, &request_id, est.cost_usd).await?;

        let mut provider_request = request.clone();
        if request.context_id.is_some() {
            let engineered = self.context_engine.engineer(&request).await?;
            provider_request.messages = engineered.messages;
            if provider_request.tools.is_empty() && !engineered.suggested_tools.is_empty() {
                provider_request.tools = engineered.suggested_tools;
                provider_request.tool_choice = Some("auto".to_string());
            }
        }

        let provider = match self.router.provider_for(&model_key) {
            Some(p) => p,
            None => {
                let _ = self.budget.release(&tenant_id, &user_id, &request_id, est.cost_usd).await;
                return Err(RouterError::UnknownModel(model_key.1.clone()).into());
            }
        };

        let upstream = match provider.stream_complete(&provider_request, &descriptor.model_name).await {
            Ok(s) => s,
            Err(e) => {
                let _ = self.budget.release(&tenant_id, &user_id, &request_id, est.cost_usd).await;
                self.router.record_failure(&model_key);
                return Err(e.into());
            }
        };

        let router = Arc::clone(&self.router);
        let budget = Arc::clone(&self.budget);
        let context_engine = Arc::clone(&self.context_engine);
        let prompt_tokens = est.prompt_tokens;
        let model_name = descriptor.model_name.clone();
        let session_id = request.identity.session_id.clone();

        let stream = async_stream::stream! {
            let _guard = router.begin_request(&model_key);
            let started = Instant::now();
            let mut accumulated = String::new();
            let mut upstream = upstream;
            let mut failed = false;

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(chunk) => {
                        accumulated.push_str(&chunk.content);
                        let is_final = chunk.is_final;
                        yield Ok(chunk);
                        if is_final {
                            break;
                        }
                    }
                    Err(e) => {
                        failed = true;
                        yield Err(e);
                        break;
                    }
                }
            }

            if failed {
                let _ = budget.release(&tenant_id, &user_id, &request_id, est.cost_usd).await;
                router.record_failure(&model_key);
                return;
            }

            router.record_success(&model_key, started.elapsed(), accumulated.len() as u32 / 4);

            let completion_tokens = (accumulated.len() / 4) as u32;
            let usage = TokenUsage::new(prompt_tokens, completion_tokens);
            let actual_cost = crate::budget::cost_for_usage(usage, &descriptor);

            if let Err(e) = budget
                .settle(&tenant_id, &user_id, &request_id, &model_name, usage.prompt_tokens, usage.completion_tokens, actual_cost)
                .await
            {
                tracing::warn!(error = %e, "failed to settle streamed completion");
            }

            if let Some(session_id) = session_id {
                let _ = context_engine.store_conversation_memory(&user_id, &session_id, &accumulated).await;
            }

            yield Ok(StreamingChunk::new(
                u32::MAX,
                format!(
                    "{{\"usage\":{{\"prompt_tokens\":{},\"completion_tokens\":{}}},\"cost_usd\":\"{}\"}}",
                    usage.prompt_tokens, usage.completion_tokens, actual_cost
                ),
            ));
            yield Ok(StreamingChunk::final_chunk(u32::MAX, "[DONE]", FinishReason::Stop));
        };

        Ok(Box::pin(stream))
    }
}
