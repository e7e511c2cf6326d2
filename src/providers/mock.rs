// Copyright (c) 2025 - Cowboy AI, LLC.

//! Mock provider - deterministic canned responses and streams, used in
//! tests and as the always-available fallback provider.

use crate::capabilities::RuntimeCapabilities;
use crate::ports::{ProviderChatStream, ProviderError, ProviderPort, ProviderResult};
use crate::value_objects::{
    ChatRequest, ChatResponse, Choice, ContextMessage, FinishReason, ModelDescriptor,
    ProviderType, StreamingChunk, TokenUsage,
};
use async_trait::async_trait;
use futures::stream;
use rust_decimal::Decimal;

pub struct MockProvider {
    delay_ms: u64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self { delay_ms: 0 }
    }

    pub fn with_delay(delay_ms: u64) -> Self {
        Self { delay_ms }
    }

    fn reply_text(&self, request: &ChatRequest) -> String {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::value_objects::MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        format!("Mock response to: {last_user}")
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderPort for MockProvider {
    async fn complete(&self, request: &ChatRequest, model_name: &str) -> ProviderResult<ChatResponse> {
        if self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        let text = self.reply_text(request);
        let prompt_tokens = request.messages.iter().map(|m| m.content.len() as u32 / 4).sum();
        let completion_tokens = text.len() as u32 / 4;

        Ok(ChatResponse {
            id: format!("mock-{}", request.identity.request_id),
            model: model_name.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ContextMessage::assistant(text),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
            }],
            usage: TokenUsage::new(prompt_tokens, completion_tokens),
            cost_usd: "0".to_string(),
        })
    }

    async fn stream_complete(
        &self,
        request: &ChatRequest,
        _model_name: &str,
    ) -> ProviderResult<ProviderChatStream> {
        let text = self.reply_text(request);
        let words: Vec<String> = text.split(' ').map(|w| format!("{w} ")).collect();
        let n = words.len() as u32;

        let chunks: Vec<ProviderResult<StreamingChunk>> = words
            .into_iter()
            .enumerate()
            .map(|(i, w)| {
                Ok(if i as u32 + 1 == n {
                    StreamingChunk::final_chunk(i as u32, w, FinishReason::Stop)
                } else {
                    StreamingChunk::new(i as u32, w)
                })
            })
            .collect();

        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn list_models(&self) -> ProviderResult<Vec<ModelDescriptor>> {
        Ok(vec![ModelDescriptor {
            provider: ProviderType::Mock,
            model_name: "mock-model".to_string(),
            capabilities: RuntimeCapabilities::BASIC_CHAT,
            max_context_length: 4_096,
            max_output_tokens: 4_096,
            cost_per_1k_prompt_tokens: Decimal::ZERO,
            cost_per_1k_completion_tokens: Decimal::ZERO,
            max_concurrency: 100,
            capability_score: 0.3,
        }])
    }

    async fn health_check(&self) -> ProviderResult<()> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
