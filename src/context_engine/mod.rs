// Copyright (c) 2025 - Cowboy AI, LLC.

//! Context Engineering Engine.
//!
//! Ties together the four sub-components below into a single
//! `engineer(request)` call that produces an `EngineeredContext` ready for
//! the serving pipeline: a system-instruction template, retrieved
//! knowledge, relevant conversation memory, and a tool hint list, packed
//! and compressed to fit `max_context_length`.
//!
//! Retrieval and memory persistence are grounded on
//! `semantic_search::{search_engine,vector_store,embedding_service}`; the
//! template/compression/importance-scoring algorithm has no teacher
//! counterpart and is grounded on `original_source/core/context_engine.py`.

mod knowledge;
mod memory;
mod template;
mod tools;

pub use knowledge::KnowledgeRetriever;
pub use memory::MemoryStore;
pub use template::TemplateEngine;
pub use tools::ToolSelector;

use crate::ports::{EmbedderPort, RelationalPort, VectorPort};
use crate::value_objects::{ChatRequest, ContextMessage, EngineeredContext, MemoryEntry, MessageRole};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Vector(#[from] crate::ports::VectorError),

    #[error(transparent)]
    Embedder(#[from] crate::ports::EmbedderError),

    #[error(transparent)]
    Relational(#[from] crate::ports::RelationalError),
}

/// Tunables for context engineering, spec.md §4.3.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub max_context_length: u32,
    /// Fraction of `max_context_length` targeted once compression triggers.
    pub compression_threshold: f32,
    pub knowledge_injection_enabled: bool,
    pub memory_retrieval_enabled: bool,
    pub template_cache_size: u64,
    /// Token budget handed to `KnowledgeRetriever` before compression.
    pub knowledge_budget_tokens: usize,
    pub memory_gc_interval: Duration,
    pub memory_recent_max_age_days: i64,
    pub memory_important_max_age_days: i64,
    pub cache_prune_interval: Duration,
    pub template_eviction_interval: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_length: 8_192,
            compression_threshold: 0.8,
            knowledge_injection_enabled: true,
            memory_retrieval_enabled: true,
            template_cache_size: 500,
            knowledge_budget_tokens: 1_000,
            memory_gc_interval: Duration::from_secs(60 * 60),
            memory_recent_max_age_days: 30,
            memory_important_max_age_days: 90,
            cache_prune_interval: Duration::from_secs(24 * 60 * 60),
            template_eviction_interval: Duration::from_secs(30 * 60),
        }
    }
}

impl ContextConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_context_length: std::env::var("CONTEXT_MAX_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_context_length),
            compression_threshold: std::env::var("CONTEXT_COMPRESSION_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.compression_threshold),
            knowledge_injection_enabled: std::env::var("CONTEXT_KNOWLEDGE_INJECTION_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.knowledge_injection_enabled),
            memory_retrieval_enabled: std::env::var("CONTEXT_MEMORY_RETRIEVAL_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.memory_retrieval_enabled),
            template_cache_size: std::env::var("CONTEXT_TEMPLATE_CACHE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.template_cache_size),
            ..defaults
        }
    }
}

/// The Context Engineering Engine: composes template, knowledge, memory and
/// tool selection into the context handed to a model.
pub struct ContextEngine {
    config: ContextConfig,
    templates: TemplateEngine,
    knowledge: KnowledgeRetriever,
    tools: ToolSelector,
    memory: MemoryStore,
    relational: Arc<dyn RelationalPort>,
    shutdown: CancellationToken,
}

impl ContextEngine {
    pub fn new(
        config: ContextConfig,
        vector: Arc<dyn VectorPort>,
        embedder: Arc<dyn EmbedderPort>,
        relational: Arc<dyn RelationalPort>,
    ) -> Self {
        Self {
            templates: TemplateEngine::new(config.template_cache_size),
            knowledge: KnowledgeRetriever::new(vector, embedder, config.knowledge_budget_tokens),
            tools: ToolSelector::new(),
            memory: MemoryStore::new(relational.clone()),
            relational,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Build the engineered context for `request` (spec.md §4.3 step 1-5).
    pub async fn engineer(&self, request: &ChatRequest) -> Result<EngineeredContext, ContextError> {
        let mut messages = request.messages.clone();

        let system_instructions = self.templates.render(request);
        inject_system_message(&mut messages, &system_instructions);

        let mut knowledge_blocks = Vec::new();
        if self.config.knowledge_injection_enabled {
            let query = request.retrieval_query();
            if !query.is_empty() {
                let chunks = self.knowledge.retrieve(&query).await?;
                knowledge_blocks = chunks.iter().map(|c| c.format_block()).collect();
                if !knowledge_blocks.is_empty() {
                    append_to_last_user_message(&mut messages, &knowledge_blocks.join("\n\n"));
                }
            }
        }

        if self.config.memory_retrieval_enabled {
            if let (Some(session_id), task_type) =
                (&request.identity.session_id, request.task_type.as_deref())
            {
                let memories = self
                    .memory
                    .relevant(&request.identity.user_id, session_id)
                    .await?;
                if !memories.is_empty() {
                    let rendered = memories
                        .iter()
                        .map(|m| format!("- {}", m.content))
                        .collect::<Vec<_>>()
                        .join("\n");
                    inject_memory_note(&mut messages, &rendered);
                }
                let _ = task_type;
            }
        }

        let suggested_tools = if request.tools.is_empty() {
            self.tools.suggest(request.task_type.as_deref(), &request.available_tools)
        } else {
            Vec::new()
        };

        let uncompressed = EngineeredContext::uncompressed(messages, suggested_tools);
        Ok(self.compress(uncompressed))
    }

    /// Shrink an engineered context to fit `max_context_length` (spec.md
    /// §4.3 step 5): target = `max_context_length * compression_threshold`,
    /// knowledge capped at target/2 (greedy, original order), memory capped
    /// at target/4 (important facts first), system instructions untouched.
    pub fn compress(&self, ctx: EngineeredContext) -> EngineeredContext {
        let estimated = ctx.estimated_tokens();
        let limit = self.config.max_context_length as usize;
        if estimated <= limit {
            return ctx;
        }

        let target = (limit as f32 * self.config.compression_threshold) as usize;
        let knowledge_budget = target / 2;
        let memory_budget = target / 4;

        let mut messages = ctx.messages;
        for message in messages.iter_mut() {
            if message.role == MessageRole::System {
                continue;
            }
            cap_labeled_section(&mut message.content, KNOWLEDGE_LABEL, knowledge_budget * 4);
            cap_labeled_section(&mut message.content, MEMORY_LABEL, memory_budget * 4);
        }

        let compressed_estimate: usize = messages.iter().map(|m| m.content.len() / 4).sum();
        let ratio = if estimated == 0 {
            1.0
        } else {
            compressed_estimate as f32 / estimated as f32
        };

        EngineeredContext {
            messages,
            suggested_tools: ctx.suggested_tools,
            compression_ratio: Some(ratio),
        }
    }

    /// Score and persist a conversational turn as a memory entry (spec.md
    /// §4.3 step 6).
    pub async fn store_conversation_memory(
        &self,
        user_id: &str,
        session_id: &str,
        content: &str,
    ) -> Result<(), ContextError> {
        let importance = importance_score(content);
        let entry = MemoryEntry {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            content: content.to_string(),
            importance,
            created_at: chrono::Utc::now(),
        };
        self.relational.store_memory(&entry).await?;
        Ok(())
    }

    /// Spawn the three maintenance loops (spec.md §4.3): hourly memory GC,
    /// 24h cache pruning, 30-minute template eviction slice.
    pub fn spawn_maintenance(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let token = this.shutdown.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(this.config.memory_gc_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        let cutoff = chrono::Utc::now()
                            - chrono::Duration::days(this.config.memory_important_max_age_days);
                        if let Err(e) = this.relational.prune_memories(cutoff).await {
                            tracing::warn!(error = %e, "memory GC pass failed");
                        }
                    }
                }
            }
        });

        let this = Arc::clone(self);
        let token = this.shutdown.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(this.config.cache_prune_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        this.memory.clear_cache();
                    }
                }
            }
        });

        let this = Arc::clone(self);
        let token = this.shutdown.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(this.config.template_eviction_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        this.templates.evict_slice(0.2);
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

fn inject_system_message(messages: &mut Vec<ContextMessage>, instructions: &str) {
    if instructions.is_empty() {
        return;
    }
    if let Some(existing) = messages.iter_mut().find(|m| m.role == MessageRole::System) {
        existing.content = instructions.to_string();
    } else {
        messages.insert(0, ContextMessage::system(instructions));
    }
}

/// Label prefixing injected knowledge within the last user message, per
/// spec.md §4.1 step 4(b) (`original_source/core/completion.py:125`).
const KNOWLEDGE_LABEL: &str = "\n\nRelevant context:\n";
/// Label prefixing injected conversation memory within the last user
/// message; distinct from `KNOWLEDGE_LABEL` so `compress()` can tell the two
/// sections apart and cap each against its own budget.
const MEMORY_LABEL: &str = "\n\nRelevant memory:\n";

fn append_to_last_user_message(messages: &mut [ContextMessage], block: &str) {
    if let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == MessageRole::User) {
        last_user.content = format!("{}{}{}", last_user.content, KNOWLEDGE_LABEL, block);
    }
}

fn inject_memory_note(messages: &mut [ContextMessage], note: &str) {
    if let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == MessageRole::User) {
        last_user.content = format!("{}{}{}", last_user.content, MEMORY_LABEL, note);
    }
}

/// Truncate the text following `label` within `content` to at most
/// `cap_chars`, stopping at the next injected-section label (or the end of
/// the string) without disturbing anything before `label`.
fn cap_labeled_section(content: &mut String, label: &str, cap_chars: usize) {
    let Some(label_pos) = content.find(label) else {
        return;
    };
    let section_start = label_pos + label.len();
    let section_end = content[section_start..]
        .find("\n\nRelevant")
        .map(|offset| section_start + offset)
        .unwrap_or(content.len());

    if section_end - section_start <= cap_chars {
        return;
    }

    let mut cut_at = section_start + cap_chars;
    while !content.is_char_boundary(cut_at) {
        cut_at -= 1;
    }
    content.replace_range(cut_at..section_end, "");
}

/// Rule-based importance scorer, constants taken from the original's
/// `_calculate_importance_score`: base 0.5, +0.2 interrogative, +0.3
/// preference vocabulary, +0.4 urgency vocabulary, -0.2 short (<10 chars),
/// +0.1 long (>100 chars), clamped to `[0, 1]`.
fn importance_score(content: &str) -> f32 {
    let lower = content.to_lowercase();
    let mut score: f32 = 0.5;

    if content.trim_end().ends_with('?')
        || ["what", "how", "why", "when", "where", "who"]
            .iter()
            .any(|w| lower.starts_with(w))
    {
        score += 0.2;
    }

    if ["prefer", "like", "want", "need", "always", "never"]
        .iter()
        .any(|w| lower.contains(w))
    {
        score += 0.3;
    }

    if ["urgent", "asap", "immediately", "critical", "important"]
        .iter()
        .any(|w| lower.contains(w))
    {
        score += 0.4;
    }

    if content.len() < 10 {
        score -= 0.2;
    } else if content.len() > 100 {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_score_rewards_urgency_and_preference() {
        let plain = importance_score("the sky is blue today and nothing else matters much");
        let urgent = importance_score("this is urgent, I need this fixed immediately please");
        assert!(urgent > plain);
    }

    #[test]
    fn importance_score_penalizes_short_messages() {
        assert!(importance_score("ok") < importance_score("sure, that sounds good to me"));
    }

    #[test]
    fn importance_score_stays_within_bounds() {
        let s = importance_score("why do you always need this urgent critical important thing immediately?");
        assert!(s <= 1.0);
    }

    #[test]
    fn inject_system_message_replaces_existing() {
        let mut messages = vec![ContextMessage::system("old"), ContextMessage::user("hi")];
        inject_system_message(&mut messages, "new");
        assert_eq!(messages[0].content, "new");
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn inject_system_message_prepends_when_absent() {
        let mut messages = vec![ContextMessage::user("hi")];
        inject_system_message(&mut messages, "be terse");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
    }

    #[test]
    fn knowledge_gets_relevant_context_label_memory_gets_its_own() {
        let mut messages = vec![ContextMessage::user("what's the refund policy?")];
        append_to_last_user_message(&mut messages, "Source: docs/policy.md\nRefunds within 30 days.");
        inject_memory_note(&mut messages, "- prefers email over chat");

        let content = &messages[0].content;
        assert!(content.contains("\n\nRelevant context:\nSource: docs/policy.md"));
        assert!(content.contains("\n\nRelevant memory:\n- prefers email over chat"));
    }

    #[test]
    fn cap_labeled_section_truncates_only_its_own_section() {
        let mut content = format!(
            "question{}{}{}{}",
            KNOWLEDGE_LABEL,
            "x".repeat(200),
            MEMORY_LABEL,
            "keep me intact",
        );
        cap_labeled_section(&mut content, KNOWLEDGE_LABEL, 20);
        assert!(content.starts_with("question"));
        assert!(content.contains(MEMORY_LABEL));
        assert!(content.ends_with("keep me intact"));
        let knowledge_section = content
            .split(KNOWLEDGE_LABEL)
            .nth(1)
            .unwrap()
            .split(MEMORY_LABEL)
            .next()
            .unwrap();
        assert_eq!(knowledge_section.len(), 20);
    }

    #[test]
    fn cap_labeled_section_noop_when_label_absent() {
        let mut content = "plain message".to_string();
        cap_labeled_section(&mut content, KNOWLEDGE_LABEL, 5);
        assert_eq!(content, "plain message");
    }
}
