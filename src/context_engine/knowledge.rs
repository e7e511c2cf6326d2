// Copyright (c) 2025 - Cowboy AI, LLC.

//! Knowledge retrieval: embed the query, similarity-search the vector
//! store, greedily pack results into a token budget.
//!
//! Grounded on `semantic_search::search_engine::SemanticSearchEngine`'s
//! embed-then-search flow, narrowed to the context engine's own
//! `KnowledgeChunk` shape.

use crate::ports::{EmbedderPort, VectorFilter, VectorPort};
use crate::value_objects::KnowledgeChunk;
use std::sync::Arc;

use super::ContextError;

const MIN_SIMILARITY: f32 = 0.7;
const TOP_K: usize = 10;

pub struct KnowledgeRetriever {
    vector: Arc<dyn VectorPort>,
    embedder: Arc<dyn EmbedderPort>,
    budget_tokens: usize,
}

impl KnowledgeRetriever {
    pub fn new(vector: Arc<dyn VectorPort>, embedder: Arc<dyn EmbedderPort>, budget_tokens: usize) -> Self {
        Self {
            vector,
            embedder,
            budget_tokens,
        }
    }

    /// Embed `query`, search for similar chunks, and greedily pack the
    /// highest-scoring ones (in score order) into `budget_tokens`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<KnowledgeChunk>, ContextError> {
        let embedding = self.embedder.embed(query).await?;
        let candidates = self
            .vector
            .similarity_search(&embedding, TOP_K, MIN_SIMILARITY, VectorFilter::default())
            .await?;

        let mut packed = Vec::new();
        let mut used = 0usize;
        for chunk in candidates {
            let cost = chunk.estimated_tokens();
            if used + cost > self.budget_tokens {
                break;
            }
            used += cost;
            packed.push(chunk);
        }
        Ok(packed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{EmbedderResult, VectorResult};
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl EmbedderPort for StubEmbedder {
        async fn embed(&self, _text: &str) -> EmbedderResult<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
        fn dimensions(&self) -> usize {
            3
        }
    }

    struct StubVector(Vec<KnowledgeChunk>);

    #[async_trait]
    impl VectorPort for StubVector {
        async fn similarity_search(
            &self,
            _embedding: &[f32],
            _top_k: usize,
            _min_score: f32,
            _filter: VectorFilter,
        ) -> VectorResult<Vec<KnowledgeChunk>> {
            Ok(self.0.clone())
        }
        async fn upsert(&self, _entries: Vec<(Vec<f32>, KnowledgeChunk)>) -> VectorResult<()> {
            Ok(())
        }
    }

    fn chunk(source: &str, content: &str, score: f32) -> KnowledgeChunk {
        KnowledgeChunk {
            source: source.into(),
            content: content.into(),
            score,
        }
    }

    #[tokio::test]
    async fn retrieve_stops_once_budget_exhausted() {
        let long_content = "x".repeat(400);
        let chunks = vec![chunk("a", &long_content, 0.9), chunk("b", &long_content, 0.8)];
        let retriever = KnowledgeRetriever::new(Arc::new(StubVector(chunks)), Arc::new(StubEmbedder), 100);
        let retrieved = retriever.retrieve("question").await.unwrap();
        assert_eq!(retrieved.len(), 1);
    }

    #[tokio::test]
    async fn retrieve_packs_all_when_within_budget() {
        let chunks = vec![chunk("a", "short one", 0.9), chunk("b", "short two", 0.8)];
        let retriever = KnowledgeRetriever::new(Arc::new(StubVector(chunks)), Arc::new(StubEmbedder), 1_000);
        let retrieved = retriever.retrieve("question").await.unwrap();
        assert_eq!(retrieved.len(), 2);
    }
}
