//! Turns a resolved profile into a ready-to-invoke client.
//!
//! Preparation (key lookup, parameter quirks, backend availability) is pure
//! and fails fast. Connecting goes through a [`ClientConnector`] and the
//! caller-owned [`ClientCache`].

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use regex_lite::Regex;
use tracing::debug;

use crate::config::LlmProfile;
use crate::error::{LlmError, ProviderError};
use crate::llm::client::{LlmClient, RequestParams};
use crate::llm::engine::InvokeOptions;
use crate::llm::profile::Candidate;
use crate::llm::providers::{ClientConnector, ConnectionTarget};
use crate::llm::registry::{ProviderId, provider_meta};

/// Temperature used when neither the call nor the profile sets one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Looks up environment variables. Swappable so tests never touch the process env.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads the real process environment.
pub fn process_env() -> EnvLookup {
    Arc::new(|name: &str| std::env::var(name).ok())
}

/// A candidate with its key, endpoint and request parameters settled.
#[derive(Debug, Clone)]
pub struct PreparedClient {
    pub profile_name: String,
    pub target: ConnectionTarget,
    pub params: RequestParams,
}

impl PreparedClient {
    pub fn provider(&self) -> ProviderId {
        self.target.provider
    }

    pub fn model(&self) -> &str {
        &self.target.model
    }
}

/// Builds provider clients for the invocation engine.
pub struct ClientFactory {
    connector: Arc<dyn ClientConnector>,
    cache: Arc<ClientCache>,
    env: EnvLookup,
}

impl ClientFactory {
    pub fn new(connector: Arc<dyn ClientConnector>) -> Self {
        Self {
            connector,
            cache: Arc::new(ClientCache::default()),
            env: process_env(),
        }
    }

    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ClientCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    /// Settle everything about `candidate` that can fail without the network.
    pub fn prepare(
        &self,
        candidate: &Candidate,
        options: &InvokeOptions,
    ) -> Result<PreparedClient, LlmError> {
        let profile = &candidate.profile;
        let provider = profile.provider;
        let meta = provider_meta(provider);

        if !backend_available(provider) {
            return Err(LlmError::BackendUnavailable(provider));
        }

        let api_key = resolve_api_key(profile, &self.env);
        if api_key.is_none() && meta.requires_api_key {
            return Err(LlmError::MissingCredential {
                profile: candidate.name.clone(),
                provider,
                api_key_env: profile.api_key_env.clone(),
            });
        }

        let base_url = profile
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(meta.default_base_url)
            .trim_end_matches('/')
            .to_string();

        let model = candidate.model().to_string();
        let params = RequestParams {
            temperature: effective_temperature(
                provider,
                &model,
                options.temperature,
                profile.temperature,
            ),
            max_tokens: profile.max_tokens,
            reasoning_effort: options.reasoning_effort.or(profile.reasoning_effort),
        };

        debug!(
            "Prepared profile '{}' ({} / {}), temperature: {:?}",
            candidate.name, provider, model, params.temperature
        );

        Ok(PreparedClient {
            profile_name: candidate.name.clone(),
            target: ConnectionTarget {
                provider,
                model,
                base_url,
                api_key,
                custom_headers: profile.custom_headers.clone(),
            },
            params,
        })
    }

    /// The cached client for `prepared`, connecting on a miss.
    pub fn client(&self, prepared: &PreparedClient) -> Result<Arc<dyn LlmClient>, ProviderError> {
        self.cache.get_or_connect(
            &prepared.profile_name,
            &prepared.target,
            self.connector.as_ref(),
        )
    }
}

/// Profile-local key first, then the variable named by `api_key_env`.
pub fn resolve_api_key(profile: &LlmProfile, env: &EnvLookup) -> Option<String> {
    if let Some(key) = profile.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        return Some(key.to_string());
    }

    profile
        .api_key_env
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .and_then(|name| env(name))
        .filter(|value| !value.trim().is_empty())
}

/// Temperature to send, or `None` to leave it out of the request.
pub fn effective_temperature(
    provider: ProviderId,
    model: &str,
    call_override: Option<f32>,
    profile_default: Option<f32>,
) -> Option<f32> {
    if provider == ProviderId::OpenAi && is_gpt5_family(model) {
        return None;
    }

    let temperature = call_override
        .or(profile_default)
        .unwrap_or(DEFAULT_TEMPERATURE);
    temperature.is_finite().then_some(temperature)
}

/// GPT-5 family models reject an explicit temperature.
pub fn is_gpt5_family(model: &str) -> bool {
    static GPT5: OnceLock<Option<Regex>> = OnceLock::new();
    GPT5.get_or_init(|| Regex::new(r"(?i)^gpt-5").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(model.trim()))
}

pub fn backend_available(provider: ProviderId) -> bool {
    match provider {
        ProviderId::Ollama => cfg!(feature = "ollama"),
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    profile: String,
    provider: ProviderId,
    model: String,
    base_url: String,
    key_fingerprint: Option<u64>,
    headers: BTreeMap<String, String>,
}

impl CacheKey {
    fn new(profile_name: &str, target: &ConnectionTarget) -> Self {
        Self {
            profile: profile_name.to_string(),
            provider: target.provider,
            model: target.model.clone(),
            base_url: target.base_url.clone(),
            key_fingerprint: target.api_key.as_deref().map(fingerprint),
            headers: target.custom_headers.clone(),
        }
    }
}

fn fingerprint(secret: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    secret.hash(&mut hasher);
    hasher.finish()
}

/// Connected clients, reused across invocations.
///
/// Entries are keyed by everything that affects the connection, so editing a
/// profile's endpoint or key naturally misses. `invalidate` drops every
/// entry for a profile name.
#[derive(Default)]
pub struct ClientCache {
    entries: Mutex<HashMap<CacheKey, Arc<dyn LlmClient>>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<dyn LlmClient>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_or_connect(
        &self,
        profile_name: &str,
        target: &ConnectionTarget,
        connector: &dyn ClientConnector,
    ) -> Result<Arc<dyn LlmClient>, ProviderError> {
        let key = CacheKey::new(profile_name, target);
        if let Some(client) = self.entries().get(&key) {
            return Ok(client.clone());
        }

        let client = connector.connect(target)?;
        self.entries().insert(key, client.clone());
        Ok(client)
    }

    /// Drop cached clients for `profile_name`. Returns how many were removed.
    pub fn invalidate(&self, profile_name: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| key.profile != profile_name);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
