//! Structured output normalization.
//!
//! Providers disagree about schema-constrained responses. Gemini's native mode
//! rejects common JSON Schema keywords and strict additional-property rules,
//! so it always goes through the text fallback: the prompt asks for a bare
//! JSON object, the response is scraped with [`extract_json_object`], and the
//! result is validated here. Other providers try their native mode first and
//! only drop to the fallback when the provider rejects the schema itself.

use jsonschema::Validator;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ConfigError, ProviderError};
use crate::llm::json::extract_json_object;
use crate::llm::registry::ProviderId;

/// Target shape for a structured invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    /// Short identifier, used as the tool / response-format name.
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema document.
    pub schema: Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            schema,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether there is an actual schema document to show the model.
    pub fn has_document(&self) -> bool {
        matches!(&self.schema, Value::Object(map) if !map.is_empty())
    }

    pub fn compile(&self) -> Result<CompiledSchema<'_>, ConfigError> {
        let validator =
            jsonschema::validator_for(&self.schema).map_err(|e| ConfigError::InvalidSchema {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(CompiledSchema {
            schema: self,
            validator,
        })
    }
}

/// A schema ready to validate responses.
pub struct CompiledSchema<'a> {
    schema: &'a OutputSchema,
    validator: Validator,
}

impl<'a> CompiledSchema<'a> {
    pub fn schema(&self) -> &'a OutputSchema {
        self.schema
    }

    /// Validate `value` and deserialize it into the caller's type.
    pub fn validate<T: DeserializeOwned>(&self, value: Value) -> Result<T, ProviderError> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(self.validation_error(errors.join("; ")));
        }

        serde_json::from_value(value).map_err(|e| self.validation_error(e.to_string()))
    }

    fn validation_error(&self, reason: String) -> ProviderError {
        ProviderError::SchemaValidation {
            schema: self.schema.name.clone(),
            reason,
        }
    }
}

/// How a structured call is carried out for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredMode {
    Native,
    Fallback,
}

pub fn structured_mode(provider: ProviderId) -> StructuredMode {
    match provider {
        ProviderId::Gemini => StructuredMode::Fallback,
        _ => StructuredMode::Native,
    }
}

/// Append bare-JSON instructions (and the schema, when there is one) to `prompt`.
pub fn fallback_prompt(prompt: &str, schema: &OutputSchema) -> String {
    let mut out = String::with_capacity(prompt.len() + 512);
    out.push_str(prompt.trim_end());
    out.push_str("\n\n## Output format\n");
    out.push_str(
        "Respond with a single JSON object and nothing else. \
         Do not wrap it in markdown code fences. \
         Do not add any explanation before or after it.",
    );

    if schema.has_document() {
        let document =
            serde_json::to_string_pretty(&schema.schema).unwrap_or_else(|_| schema.schema.to_string());
        out.push_str("\nThe object must conform to this JSON Schema:\n");
        out.push_str(&document);
    }

    out
}

/// Parse and validate a fallback-mode response.
pub fn parse_fallback_response<T: DeserializeOwned>(
    response: &str,
    schema: &CompiledSchema<'_>,
) -> Result<T, ProviderError> {
    let object = extract_json_object(response)?;
    schema.validate(Value::Object(object))
}

/// Message fragments that mean a provider rejected the schema itself rather
/// than failing for an ordinary transient reason. Matched case-insensitively.
#[derive(Debug, Clone, Copy)]
pub struct SchemaFailureSignatures {
    pub provider: ProviderId,
    pub fragments: &'static [&'static str],
}

const OPENAI_FRAGMENTS: &[&str] = &[
    "invalid schema for response_format",
    "response_format",
    "json_schema",
    "unsupported schema keyword",
    "invalid json payload",
];

pub const SCHEMA_FAILURE_SIGNATURES: &[SchemaFailureSignatures] = &[
    SchemaFailureSignatures {
        provider: ProviderId::OpenAi,
        fragments: OPENAI_FRAGMENTS,
    },
    SchemaFailureSignatures {
        provider: ProviderId::CustomOpenAiCompatible,
        fragments: OPENAI_FRAGMENTS,
    },
    SchemaFailureSignatures {
        provider: ProviderId::Anthropic,
        fragments: &[
            "input_schema",
            "unsupported schema keyword",
            "invalid json payload",
        ],
    },
    SchemaFailureSignatures {
        provider: ProviderId::Ollama,
        fragments: &[
            "invalid format",
            "invalid json schema in format",
            "chatrequest.format",
            "unsupported schema keyword",
            "invalid json payload",
        ],
    },
];

/// Whether `message` from `provider` is a schema-capability rejection.
pub fn is_schema_incompatibility(provider: ProviderId, message: &str) -> bool {
    let message = message.to_lowercase();
    SCHEMA_FAILURE_SIGNATURES
        .iter()
        .filter(|sig| sig.provider == provider)
        .flat_map(|sig| sig.fragments.iter())
        .any(|fragment| message.contains(fragment))
}

/// Reclassify a native-path failure as `SchemaIncompatible` when it matches a
/// known signature. Other errors pass through untouched.
pub fn classify_native_failure(provider: ProviderId, err: ProviderError) -> ProviderError {
    let escalate = match &err {
        ProviderError::Status { body, .. } => is_schema_incompatibility(provider, body),
        ProviderError::StructuredUnsupported { .. } => true,
        _ => false,
    };

    if escalate {
        ProviderError::SchemaIncompatible {
            provider,
            message: err.to_string(),
        }
    } else {
        err
    }
}
