//! HTTP clients, one per provider wire format.

mod anthropic;
mod gemini;
#[cfg(feature = "ollama")]
mod ollama;
mod openai;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
#[cfg(feature = "ollama")]
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::llm::client::LlmClient;
use crate::llm::registry::ProviderId;

/// Everything needed to open a connection for one profile.
#[derive(Clone)]
pub struct ConnectionTarget {
    pub provider: ProviderId,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub custom_headers: BTreeMap<String, String>,
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("custom_headers", &self.custom_headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builds transport clients.
///
/// This abstraction allows the engine to be driven by fake clients in tests.
#[cfg_attr(test, mockall::automock)]
pub trait ClientConnector: Send + Sync {
    fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn LlmClient>, ProviderError>;
}

/// Production connector backed by reqwest.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl ClientConnector for HttpConnector {
    fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn LlmClient>, ProviderError> {
        debug!(
            "Connecting {} client for model {} at {}",
            target.provider, target.model, target.base_url
        );
        let client: Arc<dyn LlmClient> = match target.provider {
            ProviderId::OpenAi | ProviderId::CustomOpenAiCompatible => {
                Arc::new(OpenAiClient::new(target)?)
            }
            ProviderId::Anthropic => Arc::new(AnthropicClient::new(target)?),
            ProviderId::Gemini => Arc::new(GeminiClient::new(target)?),
            #[cfg(feature = "ollama")]
            ProviderId::Ollama => Arc::new(OllamaClient::new(target)?),
            #[cfg(not(feature = "ollama"))]
            ProviderId::Ollama => {
                return Err(ProviderError::ClientSetup {
                    provider: ProviderId::Ollama,
                    reason: "backend not installed".to_string(),
                });
            }
        };
        Ok(client)
    }
}

pub(crate) fn http_client(provider: ProviderId) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(concat!("gitscribe/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::ClientSetup {
            provider,
            reason: e.to_string(),
        })
}

/// Convert profile headers, skipping (and logging) invalid ones.
///
/// `reserved` names the headers the client sets itself (lowercase); custom
/// values for those are dropped so the request never carries two copies.
pub(crate) fn header_map(
    provider: ProviderId,
    headers: &BTreeMap<String, String>,
    reserved: &[&str],
) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(header), Ok(_)) if reserved.contains(&header.as_str()) => {
                warn!(
                    "Ignoring custom header '{}' for {}: set by the client",
                    name, provider
                );
            }
            (Ok(header), Ok(value)) => {
                map.insert(header, value);
            }
            _ => warn!("Ignoring invalid custom header '{}' for {}", name, provider),
        }
    }
    map
}

/// POST `body` as JSON and decode a successful JSON response.
pub(crate) async fn send_json<B, R>(
    provider: ProviderId,
    request: reqwest::RequestBuilder,
    body: &B,
) -> Result<R, ProviderError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|source| ProviderError::Request { provider, source })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<R>()
        .await
        .map_err(|e| ProviderError::InvalidResponse {
            provider,
            reason: e.to_string(),
        })
}

pub(crate) fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
