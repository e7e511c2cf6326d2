// Copyright (c) 2025 - Cowboy AI, LLC.

//! Capability Lattice for AI Provider Routing
//!
//! This module implements a capability lattice for judging whether a model
//! can serve a given request. The lattice provides:
//!
//! - **meet (∧)**: Find common capabilities between providers
//! - **join (∨)**: Combine capabilities from multiple providers
//! - **satisfies (≥)**: Check if a provider meets requirements
//!
//! ## Mathematical Foundation
//!
//! The capability set forms a bounded lattice where:
//! - Bottom (⊥) = empty capabilities
//! - Top (⊤) = all capabilities
//! - Partial order defined by subset inclusion
//!
//! [`crate::router::Router`] is the lattice's main consumer: it calls
//! [`RuntimeCapabilities::satisfies`] when judging whether a candidate model
//! supports a request's requested modalities (streaming, tools, etc).

mod lattice;

pub use lattice::RuntimeCapabilities;
