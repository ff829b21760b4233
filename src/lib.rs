//! gitscribe - LLM invocation engine for git workflow text generation.
//!
//! # Overview
//!
//! Callers name a task (commit, pr, branch, release, ...) and hand over a
//! prompt. The engine resolves the task to a configured profile, talks to the
//! profile's provider (OpenAI, Gemini, Anthropic, Ollama or any
//! OpenAI-compatible endpoint) with linear-backoff retries, and returns either
//! free text or a schema-validated value.

pub mod config;
pub mod error;
pub mod llm;

// Re-export commonly used types
pub use config::{ConfigSource, FileConfig, LlmConfig, LlmProfile, RetryPolicy, StaticConfig, Task};
pub use error::{ConfigError, LlmError, ProviderError};
pub use llm::{InvocationEngine, InvokeOptions, OutputSchema, ProviderId};
