//! Static catalog of supported LLM providers and their connection defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Anthropic,
    Ollama,
    #[serde(rename = "custom-openai-compatible")]
    CustomOpenAiCompatible,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Gemini => "gemini",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Ollama => "ollama",
            ProviderId::CustomOpenAiCompatible => "custom-openai-compatible",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PROVIDERS
            .iter()
            .find(|meta| meta.id.as_str().eq_ignore_ascii_case(s.trim()))
            .map(|meta| meta.id)
            .ok_or_else(|| ConfigError::UnknownProvider(s.to_string()))
    }
}

/// Immutable catalog entry for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMeta {
    pub id: ProviderId,
    pub label: &'static str,
    pub default_base_url: &'static str,
    pub default_api_key_env: Option<&'static str>,
    pub requires_api_key: bool,
}

const PROVIDERS: &[ProviderMeta] = &[
    ProviderMeta {
        id: ProviderId::OpenAi,
        label: "OpenAI",
        default_base_url: "https://api.openai.com/v1",
        default_api_key_env: Some("OPENAI_API_KEY"),
        requires_api_key: true,
    },
    ProviderMeta {
        id: ProviderId::Gemini,
        label: "Google Gemini",
        default_base_url: "https://generativelanguage.googleapis.com/v1beta",
        default_api_key_env: Some("GEMINI_API_KEY"),
        requires_api_key: true,
    },
    ProviderMeta {
        id: ProviderId::Anthropic,
        label: "Anthropic",
        default_base_url: "https://api.anthropic.com/v1",
        default_api_key_env: Some("ANTHROPIC_API_KEY"),
        requires_api_key: true,
    },
    ProviderMeta {
        id: ProviderId::Ollama,
        label: "Ollama (local)",
        default_base_url: "http://localhost:11434",
        default_api_key_env: None,
        requires_api_key: false,
    },
    ProviderMeta {
        id: ProviderId::CustomOpenAiCompatible,
        label: "Custom (OpenAI-compatible)",
        default_base_url: "http://localhost:1234/v1",
        default_api_key_env: None,
        requires_api_key: false,
    },
];

/// Metadata for a provider. Total over every `ProviderId`.
pub fn provider_meta(id: ProviderId) -> &'static ProviderMeta {
    match id {
        ProviderId::OpenAi => &PROVIDERS[0],
        ProviderId::Gemini => &PROVIDERS[1],
        ProviderId::Anthropic => &PROVIDERS[2],
        ProviderId::Ollama => &PROVIDERS[3],
        ProviderId::CustomOpenAiCompatible => &PROVIDERS[4],
    }
}

/// All providers in stable display order.
pub fn list_providers() -> &'static [ProviderMeta] {
    PROVIDERS
}

pub fn provider_requires_api_key(id: ProviderId) -> bool {
    provider_meta(id).requires_api_key
}
