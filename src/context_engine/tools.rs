// Copyright (c) 2025 - Cowboy AI, LLC.

//! Task-type to advisory tool-descriptor mapping, supplementing spec.md's
//! categories with the original's full table
//! (`original_source/core/context_engine.py::TOOL_RECOMMENDATIONS`).

use crate::value_objects::{ToolFunction, ToolSpec};

pub struct ToolSelector;

impl Default for ToolSelector {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry per known tool: its name, description, and JSON parameter
/// schema, mirroring the original's per-tool function descriptors.
fn catalog(name: &str) -> Option<ToolSpec> {
    let (description, parameters) = match name {
        "code_executor" => (
            "Execute a snippet of code and return its output.",
            serde_json::json!({
                "type": "object",
                "properties": { "code": { "type": "string" } },
                "required": ["code"],
            }),
        ),
        "code_interpreter" => (
            "Run code in a sandboxed interpreter for analysis or transformation.",
            serde_json::json!({
                "type": "object",
                "properties": { "code": { "type": "string" } },
                "required": ["code"],
            }),
        ),
        "web_search" => (
            "Search the web and return relevant results.",
            serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
            }),
        ),
        "file_search" => (
            "Search indexed documents for relevant passages.",
            serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
            }),
        ),
        "calculator" => (
            "Evaluate a numeric expression.",
            serde_json::json!({
                "type": "object",
                "properties": { "expression": { "type": "string" } },
                "required": ["expression"],
            }),
        ),
        _ => return None,
    };
    Some(ToolSpec {
        kind: "function".to_string(),
        function: ToolFunction {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters,
        },
    })
}

impl ToolSelector {
    pub fn new() -> Self {
        Self
    }

    fn recommended_for(task_type: &str) -> &'static [&'static str] {
        match task_type {
            "code_generation" => &["code_executor", "file_search"],
            "data_analysis" => &["code_executor", "calculator"],
            "research" => &["web_search", "file_search"],
            "problem_solving" => &["code_executor", "calculator"],
            "creative_writing" => &[],
            _ => &[],
        }
    }

    /// Suggest tool descriptors for `task_type`, intersected with
    /// `available_tools` when the caller restricts the candidate set; an
    /// empty `available_tools` list means "no restriction" (spec.md §4.3
    /// step 3).
    pub fn suggest(&self, task_type: Option<&str>, available_tools: &[String]) -> Vec<ToolSpec> {
        let recommended = Self::recommended_for(task_type.unwrap_or("general"));
        recommended
            .iter()
            .filter(|name| available_tools.is_empty() || available_tools.iter().any(|a| &a.as_str() == name))
            .filter_map(|name| catalog(name))
            .collect()
    }
}
