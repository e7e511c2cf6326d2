// Copyright (c) 2025 - Cowboy AI, LLC.

//! # LLM Gateway
//!
//! A multi-tenant LLM serving gateway: adaptive model routing, context
//! engineering, per-tenant budget enforcement, and a uniform provider
//! abstraction over OpenAI, Anthropic and Ollama, composed behind one
//! serving pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                          ServingPipeline                           │
//! │                                                                    │
//! │   ChatRequest ──> Router::select_optimal ──> ContextEngine::engineer│
//! │                        │                           │               │
//! │               ┌────────┴────────┐          ┌───────┴───────┐      │
//! │               │ capability       │          │ templates,    │      │
//! │               │ lattice + EMA +  │          │ knowledge,    │      │
//! │               │ circuit breaker  │          │ memory, tools │      │
//! │               └────────┬────────┘          └───────┬───────┘      │
//! │                        v                           v               │
//! │                  BudgetManager::reserve ──> ProviderPort::complete │
//! │                        │                           │               │
//! │                        v                           v               │
//! │                  settle / release           ChatResponse / stream  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - `capabilities`: capability lattice (`RuntimeCapabilities`) used to judge
//!   model feasibility against a request
//! - `value_objects`: requests, responses, budgets, descriptors and the other
//!   domain types shared across modules
//! - `ports`: hexagonal port interfaces (`ProviderPort`, `VectorPort`,
//!   `RelationalPort`, `EphemeralKVPort`, `EmbedderPort`)
//! - `providers`: OpenAI, Anthropic, Ollama and mock adapters implementing
//!   `ProviderPort`
//! - `router`: adaptive model router (scoring, circuit breaker, registry)
//! - `context_engine`: prompt templates, knowledge retrieval, conversation
//!   memory and tool selection
//! - `budget`: per-tenant/user token and cost accounting
//! - `pipeline`: `ServingPipeline`, orchestrating the four above

pub mod capabilities;
pub mod value_objects;
pub mod ports;
pub mod providers;

pub mod router;
pub mod context_engine;
pub mod budget;
pub mod pipeline;

pub use capabilities::*;
pub use value_objects::*;
pub use ports::*;
pub use providers::{AnthropicProvider, MockProvider, OllamaProvider, OpenAiProvider};

pub use router::Router;
pub use context_engine::ContextEngine;
pub use budget::BudgetManager;
pub use pipeline::ServingPipeline;
