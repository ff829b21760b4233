//! gitscribe - CLI entry point.

use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gitscribe::config::{CONFIG_ENV_VAR, FileConfig, ReasoningEffort, Task, default_config_path};
use gitscribe::llm::{InvocationEngine, InvokeOptions, OutputSchema, list_providers};

/// Generate git workflow text with a configurable LLM backend.
#[derive(Parser, Debug)]
#[command(name = "gitscribe")]
#[command(about = "Generate git workflow text with a configurable LLM backend")]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a prompt for a task and print the result
    Ask {
        /// Task the prompt is for (commit, pr, branch, release, unwrapped, celebrate)
        #[arg(short, long)]
        task: Task,

        /// Use this profile instead of the task's preset
        #[arg(short, long)]
        profile: Option<String>,

        /// Override the profile's temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Override the profile's reasoning effort
        #[arg(long)]
        reasoning_effort: Option<ReasoningEffort>,

        /// System prompt to send with the request
        #[arg(long)]
        system: Option<String>,

        /// JSON Schema file; the response is validated and printed as JSON
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Prompt text (read from stdin when omitted)
        prompt: Option<String>,
    },

    /// List supported providers and their defaults
    Providers,

    /// Show which profiles a task would use, without calling any provider
    Resolve {
        #[arg(short, long)]
        task: Task,

        #[arg(short, long)]
        profile: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Providers => {
            for meta in list_providers() {
                let key = match (meta.requires_api_key, meta.default_api_key_env) {
                    (true, Some(env)) => format!("key: {}", env),
                    (true, None) => "key: required".to_string(),
                    (false, _) => "key: optional".to_string(),
                };
                println!(
                    "{:<26} {:<28} {} ({})",
                    meta.id, meta.label, meta.default_base_url, key
                );
            }
        }
        Commands::Resolve { task, profile } => {
            let engine = InvocationEngine::new(Arc::new(FileConfig::new(config_path.clone())));
            let options = InvokeOptions {
                profile_name: profile,
                ..InvokeOptions::default()
            };
            let candidates = engine
                .resolve(task, &options)
                .await
                .with_context(|| format!("Failed to resolve profiles for task '{}'", task))?;

            for (i, candidate) in candidates.iter().enumerate() {
                println!(
                    "{}. {} -> {} / {}",
                    i + 1,
                    candidate.name,
                    candidate.profile.provider,
                    candidate.model()
                );
            }
        }
        Commands::Ask {
            task,
            profile,
            temperature,
            reasoning_effort,
            system,
            schema,
            prompt,
        } => {
            let prompt = match prompt {
                Some(prompt) => prompt,
                None => read_stdin_prompt()?,
            };

            let engine = InvocationEngine::new(Arc::new(FileConfig::new(config_path.clone())));
            let options = InvokeOptions {
                profile_name: profile,
                temperature,
                reasoning_effort,
                system_prompt: system,
            };

            match schema {
                Some(path) => {
                    let schema = load_schema(&path).await?;
                    let value: serde_json::Value = engine
                        .invoke_structured(task, &prompt, &schema, &options)
                        .await
                        .with_context(|| format!("Task '{}' failed", task))?;
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                None => {
                    let text = engine
                        .invoke_text(task, &prompt, &options)
                        .await
                        .with_context(|| format!("Task '{}' failed", task))?;
                    println!("{}", text);
                }
            }
        }
    }

    Ok(())
}

fn read_stdin_prompt() -> Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        bail!("No prompt given. Pass it as an argument or pipe it on stdin.");
    }

    let mut prompt = String::new();
    stdin
        .read_to_string(&mut prompt)
        .context("Failed to read prompt from stdin")?;
    if prompt.trim().is_empty() {
        bail!("Prompt is empty");
    }
    Ok(prompt)
}

async fn load_schema(path: &Path) -> Result<OutputSchema> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read schema file {}", path.display()))?;
    let document: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Schema file {} is not valid JSON", path.display()))?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();
    Ok(OutputSchema::new(name, document))
}
