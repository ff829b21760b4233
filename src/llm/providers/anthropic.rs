//! Anthropic Messages API client.
//!
//! Native structured output is a single forced tool whose `input_schema` is
//! the target schema; the tool call's `input` is the result.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{ConnectionTarget, header_map, http_client, send_json, trim_base_url};
use crate::error::ProviderError;
use crate::llm::client::{ChatRequest, ChatResponse, LlmClient};
use crate::llm::registry::ProviderId;
use crate::llm::structured::OutputSchema;

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Headers this client always sets.
const RESERVED_HEADERS: &[&str] = &["anthropic-version", "x-api-key"];

/// The Messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    headers: HeaderMap,
}

impl AnthropicClient {
    pub fn new(target: &ConnectionTarget) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(ProviderId::Anthropic)?,
            endpoint: format!("{}/messages", trim_base_url(&target.base_url)),
            model: target.model.clone(),
            api_key: target.api_key.clone().map(SecretString::from),
            headers: header_map(ProviderId::Anthropic, &target.custom_headers, RESERVED_HEADERS),
        })
    }

    fn build_request<'a>(&'a self, request: &'a ChatRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system_text(),
            messages: request
                .conversation()
                .map(|m| Message {
                    role: "user",
                    content: &m.content,
                })
                .collect(),
            temperature: request.params.temperature,
            tools: None,
            tool_choice: None,
        }
    }

    async fn send(&self, body: &MessagesRequest<'_>) -> Result<Vec<ContentBlock>, ProviderError> {
        debug!(
            "Sending request to Anthropic (model: {}, temperature: {:?})",
            self.model, body.temperature
        );

        let mut request = self
            .http
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header("anthropic-version", ANTHROPIC_VERSION);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.expose_secret());
        }

        let response: MessagesResponse = send_json(ProviderId::Anthropic, request, body).await?;
        Ok(response.content)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn invoke(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let blocks = self.send(&self.build_request(request)).await?;
        let content = blocks
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
        Ok(ChatResponse { content })
    }

    async fn invoke_structured(
        &self,
        request: &ChatRequest,
        schema: &OutputSchema,
    ) -> Result<Value, ProviderError> {
        let mut body = self.build_request(request);
        body.tools = Some(vec![Tool {
            name: &schema.name,
            description: schema
                .description
                .as_deref()
                .unwrap_or("Return the result in the required structure."),
            input_schema: &schema.schema,
        }]);
        body.tool_choice = Some(json!({ "type": "tool", "name": schema.name }));

        let blocks = self.send(&body).await?;
        blocks
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::ToolUse { input } => Some(input),
                _ => None,
            })
            .ok_or(ProviderError::InvalidResponse {
                provider: ProviderId::Anthropic,
                reason: "response contained no tool_use block".to_string(),
            })
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Tool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        input: Value,
    },
    #[serde(other)]
    Other,
}
