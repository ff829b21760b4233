//! Read-only configuration snapshot consumed by the invocation engine.
//!
//! The persisted config lives in a TOML file (default
//! `~/.config/gitscribe/config.toml`, overridable with `GITSCRIBE_CONFIG`).
//! The engine never writes to it; it asks a [`ConfigSource`] for a fresh
//! snapshot at the start of each invocation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::registry::{ProviderId, provider_meta};

/// Environment variable pointing at an alternate config file.
pub const CONFIG_ENV_VAR: &str = "GITSCRIBE_CONFIG";

/// Name of the profile created when no config file exists.
pub const DEFAULT_PROFILE_NAME: &str = "default";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 1000;
const MIN_BACKOFF_MS: u64 = 100;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;

/// Application-level purpose of an LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Commit,
    Pr,
    Branch,
    Release,
    Unwrapped,
    Celebrate,
}

impl Task {
    pub const ALL: [Task; 6] = [
        Task::Commit,
        Task::Pr,
        Task::Branch,
        Task::Release,
        Task::Unwrapped,
        Task::Celebrate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Commit => "commit",
            Task::Pr => "pr",
            Task::Branch => "branch",
            Task::Release => "release",
            Task::Unwrapped => "unwrapped",
            Task::Celebrate => "celebrate",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Task::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownTask(s.to_string()))
    }
}

/// Reasoning effort hint for models that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    None,
    Low,
    Medium,
    High,
    Xhigh,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::None => "none",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
            ReasoningEffort::Xhigh => "xhigh",
        }
    }
}

impl FromStr for ReasoningEffort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(ReasoningEffort::None),
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            "xhigh" => Ok(ReasoningEffort::Xhigh),
            other => Err(format!(
                "Invalid reasoning effort '{}'. Valid values: none, low, medium, high, xhigh",
                other
            )),
        }
    }
}

/// A named endpoint binding.
///
/// The local `api_key` is never serialized and is redacted in debug output.
/// Clients convert it to a `SecretString` when they are built.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmProfile {
    pub provider: ProviderId,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
}

impl fmt::Debug for LlmProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmProfile")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("reasoning_effort", &self.reasoning_effort)
            .field("base_url", &self.base_url)
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("custom_headers", &self.custom_headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LlmProfile {
    /// A blank profile for `provider`, with the registry's key variable filled in.
    pub fn for_provider(provider: ProviderId) -> Self {
        Self {
            provider,
            model: None,
            temperature: None,
            max_tokens: None,
            reasoning_effort: None,
            base_url: None,
            api_key_env: provider_meta(provider).default_api_key_env.map(str::to_string),
            api_key: None,
            custom_headers: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// The configured model, if it is non-blank.
    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

/// Retry settings. Use the accessors; they apply the engine's floors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_ms,
        }
    }

    /// Attempts per candidate, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Backoff unit in milliseconds, never less than 100.
    pub fn backoff_unit_ms(&self) -> u64 {
        self.backoff_ms.max(MIN_BACKOFF_MS)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF_MS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Per-request budget in milliseconds; `0` disables the limit.
    #[serde(default = "default_request_ms")]
    pub request_ms: u64,
}

fn default_request_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Timeouts {
    /// The per-request limit, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_ms > 0).then(|| Duration::from_millis(self.request_ms))
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_ms: default_request_ms(),
        }
    }
}

/// Snapshot of everything the invocation engine reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub profiles: BTreeMap<String, LlmProfile>,
    pub task_presets: BTreeMap<Task, String>,
    pub default_profile: String,
    pub retry: RetryPolicy,
    pub timeouts: Timeouts,
    /// Extra profiles to try, in order, after a task's primary profile is exhausted.
    pub task_fallbacks: BTreeMap<Task, Vec<String>>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            DEFAULT_PROFILE_NAME.to_string(),
            LlmProfile::for_provider(ProviderId::OpenAi),
        );
        Self {
            profiles,
            task_presets: BTreeMap::new(),
            default_profile: DEFAULT_PROFILE_NAME.to_string(),
            retry: RetryPolicy::default(),
            timeouts: Timeouts::default(),
            task_fallbacks: BTreeMap::new(),
        }
    }
}

impl LlmConfig {
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseFailed {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// Load from `path`. A missing file yields the default config.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::from_toml_str(&content, &path.display().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::ReadFailed {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

/// Default config location: `$GITSCRIBE_CONFIG`, else
/// `$XDG_CONFIG_HOME/gitscribe/config.toml`, else `~/.config/gitscribe/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }

    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|home| PathBuf::from(home).join(".config"))
        })
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("gitscribe").join("config.toml")
}

/// Supplies configuration snapshots to the engine.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn snapshot(&self) -> Result<Arc<LlmConfig>, ConfigError>;
}

/// An in-memory snapshot that never changes.
#[derive(Debug, Clone)]
pub struct StaticConfig(Arc<LlmConfig>);

impl StaticConfig {
    pub fn new(config: LlmConfig) -> Self {
        Self(Arc::new(config))
    }
}

#[async_trait]
impl ConfigSource for StaticConfig {
    async fn snapshot(&self) -> Result<Arc<LlmConfig>, ConfigError> {
        Ok(self.0.clone())
    }
}

/// Re-reads a TOML file for every snapshot so edits apply to the next call.
#[derive(Debug, Clone)]
pub struct FileConfig {
    path: PathBuf,
}

impl FileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for FileConfig {
    async fn snapshot(&self) -> Result<Arc<LlmConfig>, ConfigError> {
        LlmConfig::load(&self.path).await.map(Arc::new)
    }
}
