// Copyright (c) 2025 - Cowboy AI, LLC.

//! Two-level system-instruction template, cached by `(task_type,
//! hash(prefs))`.
//!
//! Replaces `original_source/core/context_engine.py`'s ad hoc `HashMap` plus
//! a manual 20%-eviction sweep with `moka::sync::Cache`'s bounded LRU
//! eviction, keeping the periodic bulk-eviction behaviour via
//! `invalidate_entries_if`.

use crate::value_objects::ChatRequest;
use moka::sync::{Cache, CacheBuilder};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const BASE_PREAMBLE: &str = "You are a helpful AI assistant serving requests through a multi-tenant gateway.";

fn addendum_for(task_type: &str) -> &'static str {
    match task_type {
        "code_generation" => "Favor correct, idiomatic code over verbose explanation. Include brief rationale only when non-obvious.",
        "data_analysis" => "Be precise about assumptions and caveats in any statistical claim.",
        "research" => "Cite sources inline where possible and flag uncertainty explicitly.",
        "creative_writing" => "Prioritize voice and pacing; avoid formulaic structure.",
        _ => "Answer directly and concisely.",
    }
}

pub struct TemplateEngine {
    cache: Cache<u64, String>,
}

impl TemplateEngine {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: CacheBuilder::new(capacity)
                .support_invalidation_closures()
                .build(),
        }
    }

    /// Render (or fetch cached) system instructions for `request`.
    pub fn render(&self, request: &ChatRequest) -> String {
        let key = cache_key(request);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let addendum = addendum_for(request.task_type.as_deref().unwrap_or("general"));
        let rendered = format!("{BASE_PREAMBLE}\n\n{addendum}");
        self.cache.insert(key, rendered.clone());
        rendered
    }

    /// Evict roughly `fraction` of cached entries; the 30-minute
    /// maintenance tick (spec.md §4.3). `moka` invalidates lazily on the
    /// next access/sweep rather than synchronously.
    pub fn evict_slice(&self, fraction: f64) {
        self.cache.run_pending_tasks();
        let total = self.cache.entry_count();
        if total == 0 {
            return;
        }
        let to_evict = ((total as f64) * fraction).ceil() as u64;
        let evicted = Arc::new(AtomicU64::new(0));
        let _ = self.cache.invalidate_entries_if(move |_, _| {
            evicted.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                if n >= to_evict {
                    None
                } else {
                    Some(n + 1)
                }
            })
            .is_ok()
        });
    }
}

fn cache_key(request: &ChatRequest) -> u64 {
    let mut hasher = DefaultHasher::new();
    request.task_type.hash(&mut hasher);
    std::mem::discriminant(&request.optimization_strategy.unwrap_or_default()).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::RequestIdentity;

    fn request(task_type: Option<&str>) -> ChatRequest {
        ChatRequest {
            identity: RequestIdentity {
                tenant_id: "t".into(),
                user_id: "u".into(),
                request_id: "r".into(),
                ..Default::default()
            },
            task_type: task_type.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn render_includes_task_specific_addendum() {
        let engine = TemplateEngine::new(100);
        let rendered = engine.render(&request(Some("code_generation")));
        assert!(rendered.contains("idiomatic code"));
    }

    #[test]
    fn render_caches_identical_requests() {
        let engine = TemplateEngine::new(100);
        let first = engine.render(&request(Some("research")));
        let second = engine.render(&request(Some("research")));
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_task_type_falls_back_to_general_addendum() {
        let engine = TemplateEngine::new(100);
        let rendered = engine.render(&request(Some("unheard-of")));
        assert!(rendered.contains("Answer directly"));
    }
}
