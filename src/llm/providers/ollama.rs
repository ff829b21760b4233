//! Ollama `/api/chat` client for local models.
//!
//! No key is needed. Native structured output passes the schema as `format`.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ConnectionTarget, header_map, http_client, send_json, trim_base_url};
use crate::error::ProviderError;
use crate::llm::client::{ChatMessage, ChatRequest, ChatResponse, LlmClient};
use crate::llm::json::extract_json_object;
use crate::llm::registry::ProviderId;
use crate::llm::structured::OutputSchema;

pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    /// Only set when a proxy in front of Ollama wants a bearer token
    api_key: Option<SecretString>,
    headers: HeaderMap,
}

impl OllamaClient {
    pub fn new(target: &ConnectionTarget) -> Result<Self, ProviderError> {
        let reserved: &[&str] = if target.api_key.is_some() {
            &["authorization"]
        } else {
            &[]
        };
        Ok(Self {
            http: http_client(ProviderId::Ollama)?,
            endpoint: format!("{}/api/chat", trim_base_url(&target.base_url)),
            model: target.model.clone(),
            api_key: target.api_key.clone().map(SecretString::from),
            headers: header_map(ProviderId::Ollama, &target.custom_headers, reserved),
        })
    }

    fn build_request<'a>(
        &'a self,
        request: &'a ChatRequest,
        format: Option<&'a Value>,
    ) -> OllamaChatRequest<'a> {
        let params = &request.params;
        let options = (params.temperature.is_some() || params.max_tokens.is_some()).then_some(
            OllamaOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        );
        OllamaChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            options,
            format,
        }
    }

    async fn chat(&self, body: &OllamaChatRequest<'_>) -> Result<String, ProviderError> {
        debug!(
            "Sending request to Ollama (model: {}, structured: {})",
            self.model,
            body.format.is_some()
        );

        let mut request = self.http.post(&self.endpoint).headers(self.headers.clone());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response: OllamaChatResponse = send_json(ProviderId::Ollama, request, body).await?;
        Ok(response.message.map(|m| m.content).unwrap_or_default())
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Ollama
    }

    async fn invoke(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let content = self.chat(&self.build_request(request, None)).await?;
        Ok(ChatResponse { content })
    }

    async fn invoke_structured(
        &self,
        request: &ChatRequest,
        schema: &OutputSchema,
    ) -> Result<Value, ProviderError> {
        let content = self
            .chat(&self.build_request(request, Some(&schema.schema)))
            .await?;
        extract_json_object(&content).map(Value::Object)
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}
