// Copyright (c) 2025 - Cowboy AI, LLC.

//! Ollama `/api/chat` provider.
//!
//! Grounded directly on `ports::adapters::ollama::OllamaChatAdapter`: same
//! base URL, same 5-minute timeout for slow local models, same
//! newline-delimited-JSON `bytes_stream()` parsing (Ollama's streaming
//! format is NDJSON, not SSE, so this keeps the teacher's manual approach
//! rather than reaching for the SSE crate used by the hosted providers).
//! Retargeted from the teacher's fixed `ChatPort` contract onto
//! `ProviderPort`'s request/response envelope.

use crate::capabilities::RuntimeCapabilities;
use crate::ports::{ProviderChatStream, ProviderError, ProviderPort, ProviderResult};
use crate::providers::{with_retry, RateLimiter};
use crate::value_objects::{
    ChatRequest, ChatResponse, Choice, ContextMessage, FinishReason, MessageRole, ModelDescriptor,
    ProviderType, StreamingChunk, TokenUsage,
};
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub struct OllamaProvider {
    base_url: String,
    client: Client,
    limiter: RateLimiter,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new() -> ProviderResult<Self> {
        Self::with_url("http://localhost:11434")
    }

    pub fn with_url(base_url: &str) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            limiter: RateLimiter::new(4, 0),
            max_retries: 2,
        })
    }

    fn to_messages(context: &[ContextMessage]) -> Vec<OllamaMessage> {
        context
            .iter()
            .map(|msg| OllamaMessage {
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

    fn build_request(request: &ChatRequest, model_name: &str, stream: bool) -> OllamaChatRequest {
        OllamaChatRequest {
            model: model_name.to_string(),
            messages: Self::to_messages(&request.messages),
            stream,
            options: Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens.map(|n| n as i32),
            }),
        }
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new().expect("default Ollama client configuration is always valid")
    }
}

#[async_trait]
impl ProviderPort for OllamaProvider {
    async fn complete(&self, request: &ChatRequest, model_name: &str) -> ProviderResult<ChatResponse> {
        let body = Self::build_request(request, model_name, false);

        let response = with_retry(self.max_retries, || async {
            let _permit = self.limiter.acquire().await;
            let response = self
                .client
                .post(format!("{}/api/chat", self.base_url))
                .json(&body)
                .send()
                .await
                .map_err(|e| ProviderError::Transient(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                return Err(if status == 404 {
                    ProviderError::ModelNotAvailable(body.model.clone())
                } else {
                    super::map_status(status, response.text().await.unwrap_or_default())
                });
            }

            response
                .json::<OllamaChatResponse>()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
        })
        .await?;

        let prompt_tokens = response.prompt_eval_count.unwrap_or(0);
        let completion_tokens = response.eval_count.unwrap_or(0);

        Ok(ChatResponse {
            id: format!("ollama-{}", request.identity.request_id),
            model: model_name.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ContextMessage::assistant(response.message.content),
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
        model_name: &str,
    ) -> ProviderResult<ProviderChatStream> {
        let body = Self::build_request(request, model_name, true);

        let _permit = self.limiter.acquire().await;
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(if status == 404 {
                ProviderError::ModelNotAvailable(body.model.clone())
            } else {
                super::map_status(status, response.text().await.unwrap_or_default())
            });
        }

        let byte_stream = response.bytes_stream();
        let chunk_stream = byte_stream.enumerate().filter_map(|(idx, result)| async move {
            match result {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    for line in text.lines() {
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<OllamaChatResponse>(line) {
                            Ok(resp) => {
                                let chunk = if resp.done {
                                    StreamingChunk::final_chunk(
                                        idx as u32,
                                        resp.message.content,
                                        FinishReason::Stop,
                                    )
                                } else {
                                    StreamingChunk::new(idx as u32, resp.message.content)
                                };
                                return Some(Ok(chunk));
                            }
                            Err(e) => {
                                tracing::warn!("failed to parse Ollama stream line: {e}");
                            }
                        }
                    }
                    None
                }
                Err(e) => Some(Err(ProviderError::Transient(e.to_string()))),
            }
        });

        Ok(Box::pin(chunk_stream))
    }

    async fn list_models(&self) -> ProviderResult<Vec<ModelDescriptor>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(super::map_status(response.status().as_u16(), String::new()));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelDescriptor {
                provider: ProviderType::Ollama,
                model_name: m.name,
                capabilities: RuntimeCapabilities::BASIC_CHAT,
                max_context_length: 8_192,
                max_output_tokens: 4_096,
                cost_per_1k_prompt_tokens: Decimal::ZERO,
                cost_per_1k_completion_tokens: Decimal::ZERO,
                max_concurrency: 4,
                capability_score: 0.5,
            })
            .collect())
    }

    async fn health_check(&self) -> ProviderResult<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("Ollama not reachable: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(super::map_status(response.status().as_u16(), String::new()))
        }
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::ContextMessage;

    #[test]
    fn to_messages_maps_all_three_roles() {
        let context = vec![
            ContextMessage::system("s"),
            ContextMessage::user("u"),
            ContextMessage::assistant("a"),
        ];
        let messages = OllamaProvider::to_messages(&context);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
    }

    #[test]
    fn default_client_builds_without_panicking() {
        let _ = OllamaProvider::default();
    }
}
