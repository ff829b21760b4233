//! Provider-neutral request types and the client capability trait.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::ReasoningEffort;
use crate::error::ProviderError;
use crate::llm::registry::ProviderId;
use crate::llm::structured::OutputSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Tuning parameters after provider quirks have been applied.
///
/// A `None` temperature means the field is left out of the wire request.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RequestParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub reasoning_effort: Option<ReasoningEffort>,
}

/// One single-turn exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub params: RequestParams,
}

impl ChatRequest {
    pub fn new(system_prompt: Option<&str>, prompt: &str, params: RequestParams) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));
        Self { messages, params }
    }

    /// The system message, if any.
    pub fn system_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Non-system messages in order.
    pub fn conversation(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }

    /// Same request with the last user message replaced.
    pub fn with_user_prompt(&self, prompt: String) -> Self {
        let mut request = self.clone();
        if let Some(last) = request
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::User)
        {
            last.content = prompt;
        }
        request
    }

    /// The last user message.
    pub fn user_prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub content: String,
}

/// A ready-to-use provider client.
///
/// Every provider supports free-text `invoke`. Providers with a native
/// schema-constrained mode override `invoke_structured`; the default reports
/// the capability as missing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn invoke(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    async fn invoke_structured(
        &self,
        request: &ChatRequest,
        schema: &OutputSchema,
    ) -> Result<Value, ProviderError> {
        let _ = (request, schema);
        Err(ProviderError::StructuredUnsupported {
            provider: self.provider(),
        })
    }
}
