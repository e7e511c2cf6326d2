// Copyright (c) 2025 - Cowboy AI, LLC.

//! Value objects produced and consumed by the Context Engineering Engine.

use super::chat::ToolSpec;
use super::ContextMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chunk of retrieved knowledge, scored against the request's query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub source: String,
    pub content: String,
    pub score: f32,
}

impl KnowledgeChunk {
    /// Render as the `"Source: {src} (Relevance: {score:.2})\n{content}"`
    /// block format used when injecting into the prompt.
    pub fn format_block(&self) -> String {
        format!(
            "Source: {} (Relevance: {:.2})\n{}",
            self.source, self.score, self.content
        )
    }

    /// Rough token estimate at 4 characters per token, matching the
    /// original's budgeting heuristic.
    pub fn estimated_tokens(&self) -> usize {
        self.content.len() / 4
    }
}

/// A stored conversational memory entry for a `(user, session)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub user_id: String,
    pub session_id: String,
    pub content: String,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
}

/// The fully-engineered context handed to the serving pipeline before model
/// invocation: original messages plus injected system/knowledge/memory, the
/// tool hints to offer, and whether compression was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredContext {
    pub messages: Vec<ContextMessage>,
    pub suggested_tools: Vec<ToolSpec>,
    pub compression_ratio: Option<f32>,
}

impl EngineeredContext {
    pub fn uncompressed(messages: Vec<ContextMessage>, suggested_tools: Vec<ToolSpec>) -> Self {
        Self {
            messages,
            suggested_tools,
            compression_ratio: None,
        }
    }

    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.content.len() / 4).sum()
    }
}
