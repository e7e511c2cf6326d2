// Copyright (c) 2025 - Cowboy AI, LLC.

//! OpenAI Chat Completions API provider.
//!
//! Client construction (bearer auth header, timeout, base URL) is grounded
//! on `ai_providers::openai::OpenAIProvider::new`. Chat/streaming semantics
//! are new, targeting `/v1/chat/completions` per spec.md §4.6.

use crate::capabilities::RuntimeCapabilities;
use crate::ports::{ProviderChatStream, ProviderError, ProviderPort, ProviderResult};
use crate::providers::{with_retry, RateLimiter};
use crate::value_objects::{
    ChatRequest, ChatResponse, Choice, ContextMessage, FinishReason, MessageRole, ModelDescriptor,
    ProviderType, StreamingChunk, TokenUsage, ToolCall, ToolCallFunction,
};
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    limiter: RateLimiter,
    max_retries: u32,
}

impl OpenAiProvider {
    pub fn new(api_key: &str) -> ProviderResult<Self> {
        Self::with_base_url(api_key, "https://api.openai.com/v1")
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> ProviderResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(10, 500),
            max_retries: 3,
        })
    }

    fn to_messages(context: &[ContextMessage]) -> Vec<Message> {
        context
            .iter()
            .map(|msg| Message {
                role: match msg.role {
                    MessageRole::System => "system".to_string(),
                    MessageRole::User => "user".to_string(),
                    MessageRole::Assistant => "assistant".to_string(),
                    MessageRole::Tool => "tool".to_string(),
                },
                content: msg.content.clone(),
            })
            .collect()
    }

    fn build_request(request: &ChatRequest, model_name: &str, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model_name.to_string(),
            messages: Self::to_messages(&request.messages),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(request.tools.clone())
            },
            tool_choice: request.tool_choice.clone(),
        }
    }

    async fn send_once(&self, body: &ChatCompletionRequest) -> ProviderResult<ChatCompletionResponse> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(super::map_status(status, text));
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ProviderPort for OpenAiProvider {
    async fn complete(&self, request: &ChatRequest, model_name: &str) -> ProviderResult<ChatResponse> {
        let body = Self::build_request(request, model_name, false);
        let response = with_retry(self.max_retries, || self.send_once(&body)).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no choices returned".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                kind: tc.kind,
                function: ToolCallFunction {
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                },
            })
            .collect();

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        };

        Ok(ChatResponse {
            id: response.id,
            model: response.model,
            choices: vec![Choice {
                index: 0,
                message: ContextMessage::assistant(choice.message.content.unwrap_or_default()),
                tool_calls,
                finish_reason,
            }],
            usage: TokenUsage::new(response.usage.prompt_tokens, response.usage.completion_tokens),
            cost_usd: "0".to_string(),
        })
    }

    async fn stream_complete(
        &self,
        request: &ChatRequest,
        model_name: &str,
    ) -> ProviderResult<ProviderChatStream> {
        let body = Self::build_request(request, model_name, true);

        let _permit = self.limiter.acquire().await;
        let request_builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        let mut source = EventSource::new(request_builder)
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        let chunks = async_stream::stream! {
            let mut index = 0u32;
            loop {
                match source.next().await {
                    None => break,
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(message))) => {
                        if message.data == "[DONE]" {
                            break;
                        }
                        let Ok(chunk) = serde_json::from_str::<ChatCompletionChunk>(&message.data) else {
                            continue;
                        };
                        let Some(choice) = chunk.choices.into_iter().next() else { continue };
                        if let Some(finish) = choice.finish_reason {
                            let reason = match finish.as_str() {
                                "tool_calls" => FinishReason::ToolCalls,
                                "length" => FinishReason::Length,
                                "content_filter" => FinishReason::ContentFilter,
                                _ => FinishReason::Stop,
                            };
                            yield Ok(StreamingChunk::final_chunk(
                                index,
                                choice.delta.content.unwrap_or_default(),
                                reason,
                            ));
                            break;
                        }
                        if let Some(content) = choice.delta.content {
                            yield Ok(StreamingChunk::new(index, content));
                            index += 1;
                        }
                    }
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) => break,
                    Some(Err(e)) => {
                        yield Err(ProviderError::Transient(e.to_string()));
                        break;
                    }
                }
            }
            source.close();
        };

        Ok(Box::pin(chunks))
    }

    async fn list_models(&self) -> ProviderResult<Vec<ModelDescriptor>> {
        let models = [
            ("gpt-4o", 128_000, "2.5", "10", 0.9_f32),
            ("gpt-4o-mini", 128_000, "0.15", "0.6", 0.55),
            ("gpt-4-turbo", 128_000, "10", "30", 0.88),
        ];

        Ok(models
            .into_iter()
            .map(|(name, context, prompt_cost, completion_cost, capability_score)| ModelDescriptor {
                provider: ProviderType::OpenAI,
                model_name: name.to_string(),
                capabilities: RuntimeCapabilities::ADVANCED_CHAT,
                max_context_length: context,
                max_output_tokens: 16_384,
                cost_per_1k_prompt_tokens: Decimal::from_str(prompt_cost).unwrap_or_default(),
                cost_per_1k_completion_tokens: Decimal::from_str(completion_cost).unwrap_or_default(),
                max_concurrency: 10,
                capability_score,
            })
            .collect())
    }

    async fn health_check(&self) -> ProviderResult<()> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(super::map_status(response.status().as_u16(), String::new()))
        }
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<crate::value_objects::ToolSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    id: String,
    model: String,
    choices: Vec<ResponseChoice>,
    usage: UsageStats,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: ResponseToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct UsageStats {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::ContextMessage;

    #[test]
    fn to_messages_preserves_roles_in_order() {
        let context = vec![
            ContextMessage::system("be terse"),
            ContextMessage::user("hi"),
            ContextMessage::assistant("hello"),
        ];
        let messages = OpenAiProvider::to_messages(&context);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
    }
}
