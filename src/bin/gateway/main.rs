// Copyright (c) 2025 - Cowboy AI, LLC.

//! LLM Gateway service binary.
//!
//! Wires a [`ServingPipeline`] from real provider adapters plus the
//! in-memory ports in [`infra`], then drives it from newline-delimited JSON
//! on stdin/stdout: one `ChatRequest` per input line, one `ChatResponse` (or
//! `ErrorResponse`) per output line, streaming requests emitting one JSON
//! line per chunk. An HTTP surface is explicitly out of scope (spec.md §1);
//! this loop exists to exercise the pipeline end to end the way
//! `src/bin/agent-service.rs` exercised the NATS command loop.
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` - enable the respective hosted
//!   provider when present; Ollama and the mock provider are always
//!   registered.
//! - `OLLAMA_URL` - Ollama base URL (default: `http://localhost:11434`)
//! - `ROUTER_*`, `CONTEXT_*`, `BUDGET_*` - tuning overrides, see
//!   `router::RouterConfig`, `context_engine::ContextConfig`,
//!   `budget::BudgetConfig`.
//! - `LOG_LEVEL` - logging verbosity (default: info)

mod infra;

use futures::StreamExt;
use infra::{HashEmbedder, InMemoryKvStore, InMemoryRelationalStore, InMemoryVectorStore};
use llm_gateway::budget::{BudgetConfig, BudgetManager};
use llm_gateway::context_engine::{ContextConfig, ContextEngine};
use llm_gateway::pipeline::{PipelineError, ServingPipeline};
use llm_gateway::providers::{AnthropicProvider, MockProvider, OllamaProvider, OpenAiProvider};
use llm_gateway::router::{Router, RouterConfig};
use llm_gateway::value_objects::{ChatRequest, ErrorResponse, ProviderType};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("Starting llm-gateway...");

    let relational: Arc<InMemoryRelationalStore> = Arc::new(InMemoryRelationalStore::new());
    let kv: Arc<InMemoryKvStore> = Arc::new(InMemoryKvStore::new());
    let vector: Arc<InMemoryVectorStore> = Arc::new(InMemoryVectorStore::new());
    let embedder: Arc<HashEmbedder> = Arc::new(HashEmbedder::new(256));

    let mut router = Router::new(RouterConfig::from_env())
        .with_provider(ProviderType::Mock, Arc::new(MockProvider::new()));

    match OllamaProvider::with_url(
        &std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
    ) {
        Ok(provider) => {
            router = router.with_provider(ProviderType::Ollama, Arc::new(provider));
            info!("Ollama provider registered");
        }
        Err(e) => warn!(error = %e, "Ollama provider unavailable"),
    }

    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        match OpenAiProvider::new(&key) {
            Ok(provider) => {
                router = router.with_provider(ProviderType::OpenAI, Arc::new(provider));
                info!("OpenAI provider registered");
            }
            Err(e) => warn!(error = %e, "failed to construct OpenAI provider"),
        }
    }

    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        match AnthropicProvider::new(&key) {
            Ok(provider) => {
                router = router.with_provider(ProviderType::Anthropic, Arc::new(provider));
                info!("Anthropic provider registered");
            }
            Err(e) => warn!(error = %e, "failed to construct Anthropic provider"),
        }
    }

    let router = Arc::new(router);
    if let Err(e) = router.refresh_models().await {
        warn!(error = %e, "initial model refresh failed, continuing with no models registered");
    }
    router.spawn_maintenance();

    let context_engine = Arc::new(ContextEngine::new(
        ContextConfig::from_env(),
        vector,
        embedder,
        relational.clone(),
    ));
    context_engine.spawn_maintenance();

    let budget = Arc::new(BudgetManager::new(BudgetConfig::from_env(), relational, kv));
    budget.spawn_maintenance();

    let pipeline = Arc::new(ServingPipeline::new(
        router.clone(),
        context_engine.clone(),
        budget.clone(),
    ));

    info!("llm-gateway ready, reading ChatRequest JSON lines from stdin");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let pipeline = pipeline.clone();
                        tokio::spawn(async move {
                            handle_line(&pipeline, &line).await;
                        });
                    }
                    Ok(None) => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "error reading stdin");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, gracefully shutting down...");
                break;
            }
        }
    }

    router.shutdown();
    context_engine.shutdown();
    budget.shutdown();

    info!("llm-gateway stopped");
    Ok(())
}

async fn handle_line(pipeline: &ServingPipeline, line: &str) {
    let request: ChatRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            print_error("invalid_request", &e.to_string());
            return;
        }
    };

    if request.stream {
        match pipeline.stream(request).await {
            Ok(mut stream) => {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(chunk) => print_line(&chunk),
                        Err(e) => {
                            print_error("provider_error", &e.to_string());
                            break;
                        }
                    }
                }
            }
            Err(e) => print_pipeline_error(&e),
        }
    } else {
        match pipeline.complete(request).await {
            Ok(response) => print_line(&response),
            Err(e) => print_pipeline_error(&e),
        }
    }
}

fn print_pipeline_error(e: &PipelineError) {
    error!(error = %e, status = e.status_code(), "request failed");
    print_error("pipeline_error", &e.to_string());
}

fn print_error(kind: &str, message: &str) {
    print_line(&ErrorResponse::new(kind, message));
}

fn print_line<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            let _ = writeln!(handle, "{json}");
        }
        Err(e) => error!(error = %e, "failed to serialize response"),
    }
}
