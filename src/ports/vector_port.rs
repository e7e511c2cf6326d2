// Copyright (c) 2025 - Cowboy AI, LLC.

//! Vector Port - similarity search over embedded knowledge, the boundary
//! the Context Engine uses for retrieval (spec.md §4.3 step 2).
//!
//! Grounded on `semantic_search::vector_store::VectorStore`, narrowed to
//! the query/upsert shape the context engine actually needs: this port
//! deals in already-scored `KnowledgeChunk`s rather than raw `Embedding`
//! records, since the gateway has no need to manage embedding lifecycle
//! beyond retrieval.

use crate::value_objects::KnowledgeChunk;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("vector backend error: {0}")]
    Backend(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type VectorResult<T> = Result<T, VectorError>;

/// Filter narrowing a similarity search, e.g. to a tenant's own corpus.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub tenant_id: Option<String>,
    pub source_types: Option<Vec<String>>,
}

#[async_trait]
pub trait VectorPort: Send + Sync {
    /// Find chunks whose embeddings are most similar to `embedding`,
    /// restricted to those scoring at least `min_score`, ordered by
    /// descending score, at most `top_k` results.
    async fn similarity_search(
        &self,
        embedding: &[f32],
        top_k: usize,
        min_score: f32,
        filter: VectorFilter,
    ) -> VectorResult<Vec<KnowledgeChunk>>;

    /// Insert or replace knowledge chunks with their embeddings.
    async fn upsert(&self, entries: Vec<(Vec<f32>, KnowledgeChunk)>) -> VectorResult<()>;
}
