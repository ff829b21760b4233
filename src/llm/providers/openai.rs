//! OpenAI Chat Completions client.
//!
//! Also serves `custom-openai-compatible` endpoints (LM Studio, vLLM, proxies),
//! which speak the same wire format but may not need a key and use the older
//! `max_tokens` field.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{ConnectionTarget, header_map, http_client, send_json, trim_base_url};
use crate::config::ReasoningEffort;
use crate::error::ProviderError;
use crate::llm::client::{ChatMessage, ChatRequest, ChatResponse, LlmClient};
use crate::llm::json::extract_json_object;
use crate::llm::registry::ProviderId;
use crate::llm::structured::OutputSchema;

pub struct OpenAiClient {
    provider: ProviderId,
    http: reqwest::Client,
    endpoint: String,
    model: String,
    /// Never exposed in logs or debug output
    api_key: Option<SecretString>,
    headers: HeaderMap,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(target: &ConnectionTarget) -> Result<Self, ProviderError> {
        let reserved: &[&str] = if target.api_key.is_some() {
            &["authorization"]
        } else {
            &[]
        };
        Ok(Self {
            provider: target.provider,
            http: http_client(target.provider)?,
            endpoint: format!("{}/chat/completions", trim_base_url(&target.base_url)),
            model: target.model.clone(),
            api_key: target.api_key.clone().map(SecretString::from),
            headers: header_map(target.provider, &target.custom_headers, reserved),
        })
    }

    fn build_request<'a>(
        &'a self,
        request: &'a ChatRequest,
        response_format: Option<Value>,
    ) -> ChatCompletionRequest<'a> {
        let params = &request.params;
        let (max_tokens, max_completion_tokens) = match self.provider {
            ProviderId::OpenAi => (None, params.max_tokens),
            _ => (params.max_tokens, None),
        };

        ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: params.temperature,
            max_tokens,
            max_completion_tokens,
            reasoning_effort: params.reasoning_effort,
            response_format,
        }
    }

    async fn complete(&self, body: &ChatCompletionRequest<'_>) -> Result<String, ProviderError> {
        debug!(
            "Sending request to {} (model: {}, temperature: {:?})",
            self.provider, self.model, body.temperature
        );

        let mut request = self
            .http
            .post(&self.endpoint)
            .headers(self.headers.clone());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response: ChatCompletionResponse = send_json(self.provider, request, body).await?;
        let message = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or(ProviderError::EmptyResponse {
                provider: self.provider,
            })?;

        if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
            return Err(ProviderError::InvalidResponse {
                provider: self.provider,
                reason: format!("model refused: {}", refusal),
            });
        }

        Ok(message.content.unwrap_or_default())
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn invoke(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = self.build_request(request, None);
        let content = self.complete(&body).await?;
        Ok(ChatResponse { content })
    }

    async fn invoke_structured(
        &self,
        request: &ChatRequest,
        schema: &OutputSchema,
    ) -> Result<Value, ProviderError> {
        let mut json_schema = json!({
            "name": schema.name,
            "schema": schema.schema,
            "strict": true,
        });
        if let Some(description) = &schema.description {
            json_schema["description"] = json!(description);
        }
        let format = json!({ "type": "json_schema", "json_schema": json_schema });

        let body = self.build_request(request, Some(format));
        let content = self.complete(&body).await?;
        extract_json_object(&content).map(Value::Object)
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}
