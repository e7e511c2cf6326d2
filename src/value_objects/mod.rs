// Copyright (c) 2025 - Cowboy AI, LLC.

//! Value objects for the serving pipeline.
//!
//! Pure functional, immutable value objects following DDD principles.
//!
//! ## Core Types
//!
//! - `ChatRequest`/`ChatResponse` - the gateway's request/response envelope
//! - `ModelDescriptor`/`ModelKey` - router model metadata and live state
//! - `BudgetRecord`/`Reservation`/`UsageRecord` - budget ledger entries
//! - `EngineeredContext` - context-engine output handed to a provider
//! - `StreamingChunk`/`TokenUsage` - streaming response primitives

mod model_config;
mod streaming_chunk;

mod budget;
mod chat;
mod engineered_context;
mod model_descriptor;

// Provider identity
pub use model_config::ProviderType;

// Streaming types
pub use streaming_chunk::{
    ContextMessage, FinishReason, MessageRole, StreamingChunk, TokenUsage,
};

// Budget/usage ledger types
pub use budget::{AlertLevel, BudgetAlert, BudgetRecord, Reservation, UsageRecord};

// Chat request/response envelope types
pub use chat::{
    ChatRequest, ChatResponse, Choice, ErrorBody, ErrorResponse, OptimizationStrategy,
    RequestIdentity, RequestMetadata, ToolCall, ToolCallFunction, ToolFunction, ToolSpec,
};

// Context engineering output types
pub use engineered_context::{EngineeredContext, KnowledgeChunk, MemoryEntry};

// Router model metadata and live state
pub use model_descriptor::{
    CircuitState, LoadMetrics, ModelDescriptor, ModelKey, ModelPerformanceMetrics,
};
