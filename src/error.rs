//! Error types for gitscribe modules using thiserror.

use thiserror::Error;

use crate::llm::registry::{ProviderId, provider_meta};

/// Configuration problems. Never retried; callers should offer corrective UI.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Profile '{0}' is not defined. Add it under [profiles.{0}] in your gitscribe config.")]
    UnknownProfile(String),

    #[error("Profile '{0}' has no model configured. Set `model` for this profile before running.")]
    MissingModel(String),

    #[error("Unknown task '{0}'. Valid tasks: commit, pr, branch, release, unwrapped, celebrate")]
    UnknownTask(String),

    #[error(
        "Unknown provider '{0}'. Valid providers: openai, gemini, anthropic, ollama, custom-openai-compatible"
    )]
    UnknownProvider(String),

    #[error("Output schema '{name}' is not a valid JSON Schema: {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    ParseFailed { path: String, reason: String },
}

/// A single failed provider call. Every variant is retryable.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")]
    Request {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} API error ({status}): {body}")]
    Status {
        provider: ProviderId,
        status: u16,
        body: String,
    },

    #[error("{provider} request timed out after {ms}ms")]
    Timeout { provider: ProviderId, ms: u64 },

    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: ProviderId },

    #[error("{provider} returned an unexpected response body: {reason}")]
    InvalidResponse { provider: ProviderId, reason: String },

    #[error("No JSON object found in response: {excerpt}")]
    MalformedResponse { excerpt: String },

    #[error("Response does not match schema '{schema}': {reason}")]
    SchemaValidation { schema: String, reason: String },

    #[error("{provider} rejected the structured output schema: {message}")]
    SchemaIncompatible { provider: ProviderId, message: String },

    #[error("{provider} does not support native structured output")]
    StructuredUnsupported { provider: ProviderId },

    #[error("Failed to set up {provider} client: {reason}")]
    ClientSetup { provider: ProviderId, reason: String },
}

/// Errors surfaced to callers of the invocation engine.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("{}", missing_credential_message(.profile, .provider, .api_key_env.as_deref()))]
    MissingCredential {
        profile: String,
        provider: ProviderId,
        api_key_env: Option<String>,
    },

    #[error(
        "The {0} backend is not installed in this build. Rebuild gitscribe with `--features ollama` or pick another provider."
    )]
    BackendUnavailable(ProviderId),

    #[error("LLM invocation for task '{task}' failed after {attempts} attempt(s): {last_error}")]
    InvocationFailed {
        task: String,
        attempts: u32,
        last_error: String,
    },
}

impl LlmError {
    /// Whether the failure needs user configuration rather than a retry later.
    pub fn is_configuration_issue(&self) -> bool {
        !matches!(self, LlmError::InvocationFailed { .. })
    }
}

/// `env` is the variable the profile actually reads. Without one, point at
/// `api_key_env` instead of a variable that would be ignored.
fn missing_credential_message(profile: &str, provider: &ProviderId, env: Option<&str>) -> String {
    match (env, provider_meta(*provider).default_api_key_env) {
        (Some(var), _) => format!(
            "No API key for profile '{profile}' ({provider}). Set {var} or configure `api_key` on the profile."
        ),
        (None, Some(suggested)) => format!(
            "No API key for profile '{profile}' ({provider}). Configure `api_key`, or set `api_key_env = \"{suggested}\"` on the profile."
        ),
        (None, None) => format!(
            "No API key for profile '{profile}' ({provider}). Configure `api_key` or `api_key_env` on the profile."
        ),
    }
}
