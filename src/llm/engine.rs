//! The invocation engine: task in, text or validated data out.
//!
//! Every call takes a fresh config snapshot, resolves the candidate chain,
//! settles each candidate's key and parameters up front, then walks the chain
//! with a linear-backoff retry loop per candidate. Configuration, credential
//! and backend problems surface immediately; everything else is retried and
//! collapsed into one [`LlmError::InvocationFailed`] at the end.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::{ConfigSource, LlmConfig, ReasoningEffort, Task};
use crate::error::{LlmError, ProviderError};
use crate::llm::client::{ChatRequest, LlmClient};
use crate::llm::factory::{ClientCache, ClientFactory, EnvLookup, PreparedClient};
use crate::llm::profile::{Candidate, resolve_candidates};
use crate::llm::providers::{ClientConnector, HttpConnector};
use crate::llm::registry::ProviderId;
use crate::llm::retry::retry_with_backoff;
use crate::llm::structured::{
    CompiledSchema, OutputSchema, StructuredMode, classify_native_failure, fallback_prompt,
    parse_fallback_response, structured_mode,
};

/// Per-call overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeOptions {
    /// Bypasses the task preset and any configured fallbacks.
    pub profile_name: Option<String>,
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub system_prompt: Option<String>,
}

impl InvokeOptions {
    pub fn with_profile(mut self, name: impl Into<String>) -> Self {
        self.profile_name = Some(name.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Entry point for every LLM call.
pub struct InvocationEngine {
    config: Arc<dyn ConfigSource>,
    factory: ClientFactory,
}

impl InvocationEngine {
    /// Engine backed by real HTTP clients and the process environment.
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self::with_factory(config, ClientFactory::new(Arc::new(HttpConnector)))
    }

    pub fn with_factory(config: Arc<dyn ConfigSource>, factory: ClientFactory) -> Self {
        Self { config, factory }
    }

    /// Engine with a custom transport, e.g. a fake in tests.
    pub fn with_connector(
        config: Arc<dyn ConfigSource>,
        connector: Arc<dyn ClientConnector>,
    ) -> Self {
        Self::with_factory(config, ClientFactory::new(connector))
    }

    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.factory = self.factory.with_env_lookup(env);
        self
    }

    /// The client cache, for explicit invalidation after profile edits.
    pub fn cache(&self) -> &Arc<ClientCache> {
        self.factory.cache()
    }

    /// The candidate chain `task` would use, without calling any provider.
    pub async fn resolve(
        &self,
        task: Task,
        options: &InvokeOptions,
    ) -> Result<Vec<Candidate>, LlmError> {
        let config = self.config.snapshot().await?;
        Ok(resolve_candidates(
            task,
            options.profile_name.as_deref(),
            &config,
        )?)
    }

    /// Free-text invocation. Blank responses count as failures.
    pub async fn invoke_text(
        &self,
        task: Task,
        prompt: &str,
        options: &InvokeOptions,
    ) -> Result<String, LlmError> {
        let (config, prepared) = self.plan(task, options).await?;

        self.run(
            task,
            &config,
            &prepared,
            prompt,
            options,
            |client, request, provider| async move {
                let response = client.invoke(&request).await?;
                let text = response.content.trim();
                if text.is_empty() {
                    return Err(ProviderError::EmptyResponse { provider });
                }
                Ok(text.to_string())
            },
        )
        .await
    }

    /// Schema-validated invocation, deserialized into `T`.
    ///
    /// Gemini always uses the prompt-and-extract fallback. Other providers use
    /// their native structured mode and drop to the fallback once per attempt
    /// when the provider rejects the schema itself.
    pub async fn invoke_structured<T: DeserializeOwned>(
        &self,
        task: Task,
        prompt: &str,
        schema: &OutputSchema,
        options: &InvokeOptions,
    ) -> Result<T, LlmError> {
        let compiled = schema.compile()?;
        let (config, prepared) = self.plan(task, options).await?;
        let compiled = &compiled;

        self.run(
            task,
            &config,
            &prepared,
            prompt,
            options,
            move |client, request, provider| async move {
                match structured_mode(provider) {
                    StructuredMode::Fallback => {
                        invoke_with_fallback(client.as_ref(), &request, compiled).await
                    }
                    StructuredMode::Native => {
                        match client.invoke_structured(&request, compiled.schema()).await {
                            Ok(value) => compiled.validate(value),
                            Err(err) => match classify_native_failure(provider, err) {
                                ProviderError::SchemaIncompatible { message, .. } => {
                                    warn!(
                                        "{} rejected schema '{}', retrying with JSON fallback: {}",
                                        provider,
                                        compiled.schema().name,
                                        message
                                    );
                                    invoke_with_fallback(client.as_ref(), &request, compiled).await
                                }
                                other => Err(other),
                            },
                        }
                    }
                }
            },
        )
        .await
    }

    /// Snapshot config, resolve candidates and prepare each one. Every error
    /// here is non-retryable.
    async fn plan(
        &self,
        task: Task,
        options: &InvokeOptions,
    ) -> Result<(Arc<LlmConfig>, Vec<PreparedClient>), LlmError> {
        let config = self.config.snapshot().await?;
        let candidates = resolve_candidates(task, options.profile_name.as_deref(), &config)?;
        let prepared = candidates
            .iter()
            .map(|candidate| self.factory.prepare(candidate, options))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((config, prepared))
    }

    async fn run<T, F, Fut>(
        &self,
        task: Task,
        config: &LlmConfig,
        prepared: &[PreparedClient],
        prompt: &str,
        options: &InvokeOptions,
        call: F,
    ) -> Result<T, LlmError>
    where
        F: Fn(Arc<dyn LlmClient>, ChatRequest, ProviderId) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let timeout = config.timeouts.request_timeout();
        let mut total_attempts = 0;
        let mut last_error = None;

        for candidate in prepared {
            let provider = candidate.provider();
            let request =
                ChatRequest::new(options.system_prompt.as_deref(), prompt, candidate.params);
            let label = format!("{} via '{}' ({})", task, candidate.profile_name, provider);
            let label = label.as_str();
            let call = &call;
            let request = &request;

            info!(
                "Invoking {} for task '{}' with model {}",
                provider,
                task,
                candidate.model()
            );

            let outcome = retry_with_backoff(&config.retry, label, |attempt| async move {
                debug!("{}: attempt {}", label, attempt);
                let client = self.factory.client(candidate)?;
                with_timeout(provider, timeout, call(client, request.clone(), provider)).await
            })
            .await;

            match outcome {
                Ok(value) => return Ok(value),
                Err(exhausted) => {
                    total_attempts += exhausted.attempts;
                    warn!(
                        "Profile '{}' exhausted after {} attempt(s)",
                        candidate.profile_name, exhausted.attempts
                    );
                    last_error = Some(exhausted.last_error);
                }
            }
        }

        Err(LlmError::InvocationFailed {
            task: task.to_string(),
            attempts: total_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no candidate profiles".to_string()),
        })
    }
}

async fn with_timeout<T, Fut>(
    provider: ProviderId,
    limit: Option<Duration>,
    call: Fut,
) -> Result<T, ProviderError>
where
    Fut: Future<Output = Result<T, ProviderError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| ProviderError::Timeout {
                provider,
                ms: limit.as_millis() as u64,
            })?,
        None => call.await,
    }
}

async fn invoke_with_fallback<T: DeserializeOwned>(
    client: &dyn LlmClient,
    request: &ChatRequest,
    schema: &CompiledSchema<'_>,
) -> Result<T, ProviderError> {
    let prompt = fallback_prompt(request.user_prompt(), schema.schema());
    let response = client.invoke(&request.with_user_prompt(prompt)).await?;
    parse_fallback_response(&response.content, schema)
}
