//! The LLM provider contract.
//!
//! Concrete providers (Anthropic, OpenAI, etc.) are external collaborators
//! out of scope for this crate; what lives here is the trait every worker
//! codes against, the schema-enforced retry wrapper required by §6's LLM
//! contract, and a couple of test doubles.

use async_trait::async_trait;
use schemars::Schema;
use serde::de::DeserializeOwned;

use crate::error::{EngineError, Result};

/// A single structured-generation request: free-text prompt plus a JSON
/// Schema the response must satisfy.
#[derive(Debug, Clone)]
pub struct StructuredPrompt {
    pub prompt: String,
    pub schema: Schema,
}

/// Provider-abstracted structured generation (§6 LLM contract).
///
/// Implementations own provider-specific API keys, fallback provider
/// chaining, and a noop fallback for non-production modes — none of that
/// is this crate's concern, only the one async method is.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate_structured(&self, request: &StructuredPrompt) -> Result<serde_json::Value>;
}

/// Retries `generate_structured` up to twice on a malformed (schema-invalid)
/// response before surfacing [`EngineError::LlmFailure`], and validates the
/// returned JSON against the requested schema on every attempt — per §6,
/// schema enforcement is this wrapper's job, not each provider's.
pub async fn generate_structured_validated<T: DeserializeOwned>(
    provider: &dyn LlmProvider,
    request: &StructuredPrompt,
) -> Result<T> {
    const MAX_ATTEMPTS: u32 = 3; // initial attempt + 2 retries per §6.

    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        let value = match provider.generate_structured(request).await {
            Ok(v) => v,
            Err(e) => {
                last_err = Some(e);
                continue;
            }
        };

        let compiled = jsonschema::validator_for(&serde_json::to_value(&request.schema).unwrap_or_default())
            .map_err(|e| EngineError::SchemaViolation(format!("invalid schema definition: {e}")))?;
        if !compiled.is_valid(&value) {
            last_err = Some(EngineError::SchemaViolation(format!(
                "attempt {attempt} did not satisfy the requested schema"
            )));
            continue;
        }

        return serde_json::from_value(value)
            .map_err(|e| EngineError::SchemaViolation(format!("could not deserialize response: {e}")));
    }

    Err(last_err.unwrap_or_else(|| EngineError::LlmFailure("provider returned no usable response".into())))
}

/// Always fails with [`EngineError::LlmFailure`]. Used as the "noop fallback
/// in non-production modes" referenced in §6, and as a deterministic
/// failure injector in worker tests.
pub struct NoopLlmProvider;

#[async_trait]
impl LlmProvider for NoopLlmProvider {
    async fn generate_structured(&self, _request: &StructuredPrompt) -> Result<serde_json::Value> {
        Err(EngineError::LlmFailure(
            "no LLM provider configured (noop fallback)".into(),
        ))
    }
}

/// Returns a fixed JSON value for every call, regardless of prompt. Used by
/// worker unit tests to script a deterministic LLM response.
pub struct ScriptedLlmProvider {
    pub response: serde_json::Value,
}

impl ScriptedLlmProvider {
    pub fn new(response: serde_json::Value) -> Self {
        Self { response }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlmProvider {
    async fn generate_structured(&self, _request: &StructuredPrompt) -> Result<serde_json::Value> {
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::json_schema;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, schemars::JsonSchema)]
    struct Greeting {
        message: String,
    }

    #[tokio::test]
    async fn noop_provider_always_fails() {
        let provider = NoopLlmProvider;
        let schema = json_schema!({"type": "object"});
        let req = StructuredPrompt {
            prompt: "hi".into(),
            schema,
        };
        let result: Result<serde_json::Value> = provider.generate_structured(&req).await;
        assert!(matches!(result, Err(EngineError::LlmFailure(_))));
    }

    #[tokio::test]
    async fn scripted_provider_validates_and_deserializes() {
        let provider = ScriptedLlmProvider::new(serde_json::json!({"message": "hello"}));
        let schema = schemars::schema_for!(Greeting);
        let req = StructuredPrompt {
            prompt: "greet me".into(),
            schema,
        };
        let greeting: Greeting = generate_structured_validated(&provider, &req).await.unwrap();
        assert_eq!(greeting.message, "hello");
    }

    #[tokio::test]
    async fn schema_violation_surfaces_as_llm_failure_after_retries() {
        let provider = ScriptedLlmProvider::new(serde_json::json!({"unexpected": true}));
        let schema = schemars::schema_for!(Greeting);
        let req = StructuredPrompt {
            prompt: "greet me".into(),
            schema,
        };
        let result: Result<Greeting> = generate_structured_validated(&provider, &req).await;
        assert!(result.is_err());
    }
}
