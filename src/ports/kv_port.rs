// Copyright (c) 2025 - Cowboy AI, LLC.

//! Ephemeral KV Port - TTL'd key/value storage backing budget reservations
//! and rate-limit counters. A real deployment backs this with something
//! like Redis; this crate only defines the contract (spec.md §2).

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KVError {
    #[error("ephemeral store error: {0}")]
    Backend(String),
}

pub type KVResult<T> = Result<T, KVError>;

#[async_trait]
pub trait EphemeralKVPort: Send + Sync {
    /// Set `key` to `value` with the given TTL only if it does not already
    /// exist. Returns `true` if the reservation was created.
    async fn reserve(&self, key: &str, value: &[u8], ttl: Duration) -> KVResult<bool>;

    async fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>>;

    /// Remove a key, returning whether it was present. Must be idempotent:
    /// deleting an already-absent key is success, not an error.
    async fn delete(&self, key: &str) -> KVResult<bool>;

    /// Atomically increment a counter, creating it with the given TTL if
    /// absent, returning the post-increment value. Used for
    /// `rate_limit:{user_id}:{window}` counters.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> KVResult<u64>;
}
