// Copyright (c) 2025 - Cowboy AI, LLC.

//! Embedder Port - text-to-vector embedding generation, used by the
//! Context Engine before every `VectorPort::similarity_search` call.
//!
//! Grounded on `semantic_search::embedding_service::EmbeddingService`,
//! narrowed to the single `embed` operation the context engine needs.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("embedding generation failed: {0}")]
    Generation(String),
}

pub type EmbedderResult<T> = Result<T, EmbedderError>;

#[async_trait]
pub trait EmbedderPort: Send + Sync {
    async fn embed(&self, text: &str) -> EmbedderResult<Vec<f32>>;

    fn dimensions(&self) -> usize;
}
