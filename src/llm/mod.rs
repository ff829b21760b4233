//! LLM invocation: provider registry, profile resolution, clients, retry and
//! structured-output normalization.

pub mod client;
pub mod engine;
pub mod factory;
pub mod json;
pub mod profile;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod structured;

pub use client::{ChatMessage, ChatRequest, ChatResponse, LlmClient, RequestParams, Role};
pub use engine::{InvocationEngine, InvokeOptions};
pub use factory::{ClientCache, ClientFactory, EnvLookup, PreparedClient, process_env};
pub use json::extract_json_object;
pub use profile::{Candidate, resolve_candidates};
pub use providers::{ClientConnector, ConnectionTarget, HttpConnector};
pub use registry::{ProviderId, ProviderMeta, list_providers, provider_meta, provider_requires_api_key};
pub use retry::{LinearBackoff, RetriesExhausted, retry_with_backoff};
pub use structured::{OutputSchema, StructuredMode, structured_mode};
