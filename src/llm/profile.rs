//! Task to profile resolution.

use crate::config::{LlmConfig, LlmProfile, Task};
use crate::error::ConfigError;

/// A profile the engine will attempt, in chain order.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub profile: LlmProfile,
}

impl Candidate {
    /// The validated model name. Resolution guarantees it is non-blank.
    pub fn model(&self) -> &str {
        self.profile.model_name().unwrap_or_default()
    }
}

/// Resolve the ordered candidate chain for `task`.
///
/// The primary profile is the explicit override, else the task preset, else
/// the config default. Without an override, the task's configured fallbacks
/// follow in order. Every candidate must exist and name a model.
pub fn resolve_candidates(
    task: Task,
    override_name: Option<&str>,
    config: &LlmConfig,
) -> Result<Vec<Candidate>, ConfigError> {
    let explicit = override_name.filter(|name| !name.trim().is_empty());
    let primary = explicit
        .or_else(|| config.task_presets.get(&task).map(String::as_str))
        .unwrap_or(config.default_profile.as_str());

    let mut names = vec![primary];
    if explicit.is_none()
        && let Some(fallbacks) = config.task_fallbacks.get(&task)
    {
        for name in fallbacks {
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
    }

    names
        .into_iter()
        .map(|name| lookup(name, config))
        .collect()
}

fn lookup(name: &str, config: &LlmConfig) -> Result<Candidate, ConfigError> {
    let profile = config
        .profiles
        .get(name)
        .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;

    if profile.model_name().is_none() {
        return Err(ConfigError::MissingModel(name.to_string()));
    }

    Ok(Candidate {
        name: name.to_string(),
        profile: profile.clone(),
    })
}
