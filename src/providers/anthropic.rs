// Copyright (c) 2025 - Cowboy AI, LLC.

//! Anthropic Messages API provider.
//!
//! Client construction (headers, timeout, base URL) is grounded on
//! `ai_providers::anthropic::AnthropicProvider::new`. The chat semantics are
//! new: full multi-turn completion and SSE streaming against
//! `/v1/messages`, retargeted from the teacher's single-shot graph-analysis
//! prompt to spec.md §4.6's general chat contract.

use crate::capabilities::RuntimeCapabilities;
use crate::ports::{ProviderChatStream, ProviderError, ProviderPort, ProviderResult};
use crate::providers::{with_retry, RateLimiter};
use crate::value_objects::{
    ChatRequest, ChatResponse, Choice, ContextMessage, FinishReason, MessageRole, ModelDescriptor,
    ProviderType, StreamingChunk, TokenUsage, ToolCall, ToolCallFunction,
};
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    limiter: RateLimiter,
    max_retries: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: &str) -> ProviderResult<Self> {
        Self::with_base_url(api_key, "https://api.anthropic.com/v1")
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> ProviderResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(5, 50),
            max_retries: 3,
        })
    }

    fn to_messages(context: &[ContextMessage]) -> (Option<String>, Vec<Message>) {
        let mut system = None;
        let mut messages = Vec::new();
        for msg in context {
            match msg.role {
                MessageRole::System => {
                    system = Some(match system {
                        Some(existing) => format!("{existing}\n{}", msg.content),
                        None => msg.content.clone(),
                    });
                }
                MessageRole::User => messages.push(Message {
                    role: "user".to_string(),
                    content: msg.content.clone(),
                }),
                MessageRole::Assistant => messages.push(Message {
                    role: "assistant".to_string(),
                    content: msg.content.clone(),
                }),
                MessageRole::Tool => messages.push(Message {
                    role: "user".to_string(),
                    content: msg.content.clone(),
                }),
            }
        }
        (system, messages)
    }

    /// Anthropic's tool wire shape is flat (`{name, description,
    /// input_schema}`) rather than OpenAI's nested `{type, function}`.
    fn to_tools(tools: &[crate::value_objects::ToolSpec]) -> Vec<Tool> {
        tools
            .iter()
            .map(|t| Tool {
                name: t.function.name.clone(),
                description: t.function.description.clone(),
                input_schema: t.function.parameters.clone(),
            })
            .collect()
    }

    fn build_request(request: &ChatRequest, model_name: &str) -> MessageRequest {
        let (system, messages) = Self::to_messages(&request.messages);
        MessageRequest {
            model: model_name.to_string(),
            system,
            messages,
            max_tokens: request.max_tokens.unwrap_or(4096),
            temperature: request.temperature,
            stream: request.stream,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(Self::to_tools(&request.tools))
            },
        }
    }

    async fn send_once(&self, body: &MessageRequest) -> ProviderResult<MessageResponse> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
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
            .json::<MessageResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ProviderPort for AnthropicProvider {
    async fn complete(&self, request: &ChatRequest, model_name: &str) -> ProviderResult<ChatResponse> {
        let mut body = Self::build_request(request, model_name);
        body.stream = false;

        let response = with_retry(self.max_retries, || self.send_once(&body)).await?;

        let text = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolUse { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let tool_calls = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    kind: "function".to_string(),
                    function: ToolCallFunction {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                }),
                ContentBlock::Text { .. } => None,
            })
            .collect::<Vec<_>>();

        let finish_reason = match response.stop_reason.as_deref() {
            Some("tool_use") => FinishReason::ToolCalls,
            Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Stop,
        };

        Ok(ChatResponse {
            id: response.id,
            model: response.model,
            choices: vec![Choice {
                index: 0,
                message: ContextMessage::assistant(text),
                tool_calls,
                finish_reason,
            }],
            usage: TokenUsage::new(response.usage.input_tokens, response.usage.output_tokens),
            cost_usd: "0".to_string(),
        })
    }

    async fn stream_complete(
        &self,
        request: &ChatRequest,
        model_name: &str,
    ) -> ProviderResult<ProviderChatStream> {
        let mut body = Self::build_request(request, model_name);
        body.stream = true;

        let _permit = self.limiter.acquire().await;
        let request_builder = self.client.post(format!("{}/messages", self.base_url)).json(&body);
        let mut source = EventSource::new(request_builder)
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        let chunks = async_stream::stream! {
            let mut index = 0u32;
            loop {
                match source.next().await {
                    None => break,
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(message))) => {
                        if message.event == "message_stop" {
                            yield Ok(StreamingChunk::completion(index, FinishReason::Stop));
                            break;
                        }
                        let Ok(event) = serde_json::from_str::<StreamEvent>(&message.data) else {
                            continue;
                        };
                        match event {
                            StreamEvent::ContentBlockDelta { delta } => {
                                yield Ok(StreamingChunk::new(index, delta.text));
                                index += 1;
                            }
                            StreamEvent::MessageDelta { delta } => {
                                let reason = match delta.stop_reason.as_deref() {
                                    Some("tool_use") => FinishReason::ToolCalls,
                                    Some("max_tokens") => FinishReason::Length,
                                    _ => FinishReason::Stop,
                                };
                                yield Ok(StreamingChunk::completion(index, reason));
                            }
                            StreamEvent::Other => {}
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
            ("claude-opus-4-20250514", 200_000, "15", "75", 0.95_f32),
            ("claude-sonnet-4-20250514", 200_000, "3", "15", 0.85),
            ("claude-3-5-haiku-20241022", 200_000, "0.8", "4", 0.6),
        ];

        Ok(models
            .into_iter()
            .map(|(name, context, prompt_cost, completion_cost, capability_score)| ModelDescriptor {
                provider: ProviderType::Anthropic,
                model_name: name.to_string(),
                capabilities: RuntimeCapabilities::ADVANCED_CHAT,
                max_context_length: context,
                max_output_tokens: 8_192,
                cost_per_1k_prompt_tokens: Decimal::from_str(prompt_cost).unwrap_or_default(),
                cost_per_1k_completion_tokens: Decimal::from_str(completion_cost).unwrap_or_default(),
                max_concurrency: 5,
                capability_score,
            })
            .collect())
    }

    async fn health_check(&self) -> ProviderResult<()> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .json(&MessageRequest {
                model: "claude-3-5-haiku-20241022".to_string(),
                system: None,
                messages: vec![Message {
                    role: "user".to_string(),
                    content: "ping".to_string(),
                }],
                max_tokens: 1,
                temperature: None,
                stream: false,
                tools: None,
            })
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if response.status().is_success() || response.status().as_u16() == 400 {
            Ok(())
        } else {
            Err(super::map_status(response.status().as_u16(), String::new()))
        }
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct Tool {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: TextDelta },
    MessageDelta { delta: MessageDeltaInner },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextDelta {
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaInner {
    stop_reason: Option<String>,
}
