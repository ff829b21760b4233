//! Google Gemini `generateContent` client.
//!
//! Text only. Structured calls for Gemini always take the prompt-and-extract
//! fallback, so this client keeps the default `invoke_structured`.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ConnectionTarget, header_map, http_client, send_json, trim_base_url};
use crate::error::ProviderError;
use crate::llm::client::{ChatRequest, ChatResponse, LlmClient};
use crate::llm::registry::ProviderId;

pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    headers: HeaderMap,
}

impl GeminiClient {
    pub fn new(target: &ConnectionTarget) -> Result<Self, ProviderError> {
        let model = target.model.trim_start_matches("models/").to_string();
        Ok(Self {
            http: http_client(ProviderId::Gemini)?,
            endpoint: format!(
                "{}/models/{}:generateContent",
                trim_base_url(&target.base_url),
                model
            ),
            model,
            api_key: target.api_key.clone().map(SecretString::from),
            headers: header_map(ProviderId::Gemini, &target.custom_headers, &["x-goog-api-key"]),
        })
    }

    fn build_request<'a>(&self, request: &'a ChatRequest) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            system_instruction: request.system_text().map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            contents: request
                .conversation()
                .map(|m| Content {
                    role: Some("user"),
                    parts: vec![Part { text: &m.content }],
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: request.params.temperature,
                max_output_tokens: request.params.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn invoke(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = self.build_request(request);
        debug!(
            "Sending request to Gemini (model: {}, temperature: {:?})",
            self.model, body.generation_config.temperature
        );

        let mut http = self.http.post(&self.endpoint).headers(self.headers.clone());
        if let Some(key) = &self.api_key {
            http = http.header("x-goog-api-key", key.expose_secret());
        }

        let response: GenerateContentResponse = send_json(ProviderId::Gemini, http, &body).await?;

        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::InvalidResponse {
                provider: ProviderId::Gemini,
                reason: format!("prompt blocked: {}", reason),
            });
        }

        let content = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(ChatResponse { content })
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}
