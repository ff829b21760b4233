//! Shared test utilities for integration tests.
//!
//! Not all functions are used by every test file, but they're shared across tests.
#![allow(dead_code)]

use std::sync::Arc;

use gitscribe::config::{LlmConfig, LlmProfile, RetryPolicy, StaticConfig};
use gitscribe::llm::{EnvLookup, InvocationEngine, OutputSchema, ProviderId};
use serde::Deserialize;
use serde_json::{Value, json};
use wiremock::MockServer;

/// An environment with no variables set.
pub fn empty_env() -> EnvLookup {
    Arc::new(|_: &str| None)
}

/// A profile pointing at the mock server.
pub fn profile(provider: ProviderId, model: &str, base_url: String) -> LlmProfile {
    let mut profile = LlmProfile::for_provider(provider).with_model(model);
    profile.base_url = Some(base_url);
    profile
}

/// Config with a single `default` profile and fast retries.
pub fn single_profile_config(profile: LlmProfile, max_attempts: u32) -> LlmConfig {
    let mut config = LlmConfig::default();
    config.profiles.insert("default".to_string(), profile);
    config.retry = RetryPolicy::new(max_attempts, 100);
    config
}

/// Engine over a static config that never reads the process environment.
pub fn engine(config: LlmConfig) -> InvocationEngine {
    InvocationEngine::new(Arc::new(StaticConfig::new(config))).with_env_lookup(empty_env())
}

/// The `/v1` base URL most OpenAI-style servers use.
pub fn v1(server: &MockServer) -> String {
    format!("{}/v1", server.uri())
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct ReleaseNotes {
    pub title: String,
    pub notes: String,
}

pub fn release_schema() -> OutputSchema {
    OutputSchema::new(
        "release_notes",
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "notes": {"type": "string"}
            },
            "required": ["title", "notes"],
            "additionalProperties": false
        }),
    )
    .with_description("Release title and notes")
}

/// JSON bodies of every request the server received, in order.
pub async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.body_json::<Value>().expect("request body is JSON"))
        .collect()
}

/// An OpenAI chat completion response carrying `content`.
pub fn openai_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}
