// Copyright (c) 2025 - Cowboy AI, LLC.

//! Chat request/response value objects
//!
//! The wire-level shapes exchanged with callers of the serving pipeline.
//! These wrap `ContextMessage`/`StreamingChunk` (already defined in
//! `streaming_chunk.rs`) with the envelope fields the pipeline needs:
//! tenant/user identity, sampling parameters, and tool declarations.

use super::{ContextMessage, FinishReason, TokenUsage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A callable tool declaration, OpenAI function-calling shaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Arguments as a JSON-encoded string, per OpenAI/Anthropic wire format.
    pub arguments: String,
}

/// Named weight vector consumed by the router's scoring function
/// (spec.md §4.2's strategy table; `["base","perf","cost","load","avail"]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStrategy {
    Cost,
    Performance,
    #[default]
    Balanced,
    Availability,
}

/// Identity and policy fields carried on every request, independent of the
/// conversation content itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub tenant_id: String,
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub request_id: String,
}

/// An inbound chat completion request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub identity: RequestIdentity,
    pub messages: Vec<ContextMessage>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub tool_choice: Option<String>,
    /// Tool names the caller permits for this request; the context engine
    /// intersects this against its task-type hint table (spec.md §4.3 step
    /// 3). Empty means "no caller-side restriction".
    #[serde(default)]
    pub available_tools: Vec<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub preferred_model: Option<String>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: bool,
    /// Free-text query used for knowledge retrieval; defaults to the last
    /// user message when absent (spec.md §4.3 step 2).
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub optimization_strategy: Option<OptimizationStrategy>,
    /// Per-request budget cap in USD, stricter than (never looser than) the
    /// tenant/user's standing budget.
    #[serde(default)]
    pub budget_limit: Option<String>,
}

impl ChatRequest {
    /// The text used to drive knowledge retrieval and importance scoring.
    pub fn retrieval_query(&self) -> String {
        if let Some(q) = &self.query {
            return q.clone();
        }
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == super::MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

/// A single completion choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ContextMessage,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

/// A completed (non-streaming) chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: TokenUsage,
    /// Cost of this request, in µUSD-precision decimal string form so it
    /// survives JSON round-trips without float drift.
    pub cost_usd: String,
}

/// Error body shape returned to callers, per spec.md §7.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl ErrorResponse {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                kind: kind.into(),
                param: None,
            },
        }
    }
}

/// Free-form key/value bag attached to a request for routing hints
/// (e.g. `{"latency_sensitive": "true"}`), mirroring the original's
/// `metadata` dict on completion requests.
pub type RequestMetadata = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::MessageRole;

    #[test]
    fn retrieval_query_falls_back_to_last_user_message() {
        let req = ChatRequest {
            identity: RequestIdentity {
                tenant_id: "t1".into(),
                user_id: "u1".into(),
                request_id: "r1".into(),
                ..Default::default()
            },
            messages: vec![
                ContextMessage::user("first"),
                ContextMessage::assistant("reply"),
                ContextMessage::user("second"),
            ],
            ..Default::default()
        };
        assert_eq!(req.retrieval_query(), "second");
        assert_ne!(req.messages[0].role, MessageRole::Assistant);
    }

    #[test]
    fn explicit_query_overrides_messages() {
        let mut req = ChatRequest {
            identity: RequestIdentity {
                tenant_id: "t1".into(),
                user_id: "u1".into(),
                request_id: "r1".into(),
                ..Default::default()
            },
            messages: vec![ContextMessage::user("ignored")],
            ..Default::default()
        };
        req.query = Some("explicit".to_string());
        assert_eq!(req.retrieval_query(), "explicit");
    }
}
