// Copyright (c) 2025 - Cowboy AI, LLC.

//! Provider type identifier shared across the router, providers and budget
//! modules.

use serde::{Deserialize, Serialize};

/// AI model provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// OpenAI API (GPT-4, etc.)
    OpenAI,
    /// Anthropic API (Claude, etc.)
    Anthropic,
    /// Local Ollama instance
    Ollama,
    /// Mock provider for testing
    #[default]
    Mock,
}

impl ProviderType {
    /// Get the display name for this provider
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "OpenAI",
            ProviderType::Anthropic => "Anthropic",
            ProviderType::Ollama => "Ollama",
            ProviderType::Mock => "Mock",
        }
    }

    /// Check if this provider requires an API key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderType::OpenAI | ProviderType::Anthropic)
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_display() {
        assert_eq!(ProviderType::OpenAI.display_name(), "OpenAI");
        assert_eq!(ProviderType::Anthropic.display_name(), "Anthropic");
        assert_eq!(ProviderType::Ollama.display_name(), "Ollama");
        assert_eq!(ProviderType::Mock.display_name(), "Mock");
    }

    #[test]
    fn test_provider_requires_api_key() {
        assert!(ProviderType::OpenAI.requires_api_key());
        assert!(ProviderType::Anthropic.requires_api_key());
        assert!(!ProviderType::Ollama.requires_api_key());
        assert!(!ProviderType::Mock.requires_api_key());
    }
}
