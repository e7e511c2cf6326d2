// Copyright (c) 2025 - Cowboy AI, LLC.

//! Hexagonal architecture: port interfaces for the serving pipeline's
//! external dependencies.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       ServingPipeline                          │
//! └──────┬────────────┬─────────────┬─────────────┬───────────────┘
//!        │            │             │             │
//!        v            v             v             v
//!  ProviderPort   VectorPort  RelationalPort  EphemeralKVPort
//!  (chat models)  (embeddings (budgets, usage  (rate-limit
//!                  search)     memories)        windows, reservations)
//! ```
//!
//! Each port is implemented by adapters under [`crate::providers`] (for
//! `ProviderPort`) or by infrastructure supplied at binary-construction time
//! for the others; the pipeline and its collaborators depend only on the
//! trait objects declared here.

// Gateway serving-pipeline ports (spec.md §2)
mod embedder_port;
mod kv_port;
mod provider_port;
mod relational_port;
mod vector_port;

pub use embedder_port::{EmbedderError, EmbedderPort, EmbedderResult};
pub use kv_port::{EphemeralKVPort, KVError, KVResult};
pub use provider_port::{ProviderChatStream, ProviderError, ProviderPort, ProviderResult};
pub use relational_port::{RelationalError, RelationalPort, RelationalResult};
pub use vector_port::{VectorError, VectorFilter, VectorPort, VectorResult};
