//! The LLM provider boundary.
//!
//! The core never issues a free-form request: every call carries an
//! [`OutputShape`] — a fixed choice list or a JSON Schema — and the reply
//! is validated against it before any stage sees it. Providers are
//! interchangeable behind the [`Provider`] trait; the pipeline ships an
//! HTTP implementation ([`OpenRouterProvider`](openrouter::OpenRouterProvider)),
//! a chain-of-providers fallback, and a scripted provider for tests.

pub mod openrouter;

use crate::error::PipelineError;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Boxed future returned by [`Provider::generate`].
pub type ProviderFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, PipelineError>> + Send + 'a>>;

/// The structural constraint on a provider reply.
#[derive(Debug, Clone)]
pub enum OutputShape {
    /// Free text (used only for the direct-answer path).
    Text,
    /// Exactly one of the listed lowercase tokens.
    Choice(Vec<String>),
    /// An object matching this JSON Schema.
    Json(Value),
}

/// One structured-output request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system: String,
    pub user: String,
    pub shape: OutputShape,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerateRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, shape: OutputShape) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            shape,
            temperature: 0.1,
            max_tokens: 1024,
        }
    }
}

/// A black-box structured-output generator.
///
/// Implementations return a parsed [`Value`]; shape conformance is
/// re-checked by [`generate_checked`] on the caller side, so a provider
/// does not have to validate its own output.
pub trait Provider: Send + Sync {
    fn generate(&self, request: &GenerateRequest) -> ProviderFuture<'_>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "provider"
    }
}

/// Validate a provider reply against the request's output shape.
pub fn check_shape(shape: &OutputShape, value: &Value) -> Result<(), PipelineError> {
    match shape {
        OutputShape::Text => Ok(()),
        OutputShape::Choice(options) => {
            let got = value
                .as_str()
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_default();
            if options.iter().any(|o| o == &got) {
                Ok(())
            } else {
                Err(PipelineError::SchemaInvalid(format!(
                    "expected one of {options:?}, got {value}"
                )))
            }
        }
        OutputShape::Json(schema) => {
            let validator = jsonschema::validator_for(schema)
                .map_err(|e| PipelineError::SchemaInvalid(format!("bad schema: {e}")))?;
            let errors: Vec<String> = validator
                .iter_errors(value)
                .map(|e| format!("{}: {e}", e.instance_path()))
                .collect();
            if errors.is_empty() {
                Ok(())
            } else {
                Err(PipelineError::SchemaInvalid(errors.join("; ")))
            }
        }
    }
}

/// Generate and validate, retrying once with a stricter system prompt on a
/// shape violation. The second failure surfaces as `SchemaInvalid`.
pub async fn generate_checked(
    provider: &dyn Provider,
    request: &GenerateRequest,
) -> Result<Value, PipelineError> {
    let value = provider.generate(request).await?;
    match check_shape(&request.shape, &value) {
        Ok(()) => Ok(value),
        Err(first) => {
            warn!(
                "{}: output failed validation ({first}), retrying with stricter prompt",
                provider.name()
            );
            let strict = GenerateRequest {
                system: format!(
                    "{}\n\nYour previous reply was structurally invalid. Reply with ONLY the \
                     requested format, with no prose and no code fences.",
                    request.system
                ),
                ..request.clone()
            };
            let value = provider.generate(&strict).await?;
            check_shape(&request.shape, &value)?;
            Ok(value)
        }
    }
}

// ── Fallback chain ─────────────────────────────────────────────────

/// Tries a primary provider first and falls back on transport failure.
/// Shape violations are not retried here; [`generate_checked`] owns that.
pub struct FallbackProvider {
    primary: Box<dyn Provider>,
    fallback: Box<dyn Provider>,
}

impl FallbackProvider {
    pub fn new(primary: Box<dyn Provider>, fallback: Box<dyn Provider>) -> Self {
        Self { primary, fallback }
    }
}

impl Provider for FallbackProvider {
    fn generate(&self, request: &GenerateRequest) -> ProviderFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            match self.primary.generate(&request).await {
                Err(PipelineError::ProviderUnavailable(reason)) => {
                    warn!(
                        "{} unavailable ({reason}); falling back to {}",
                        self.primary.name(),
                        self.fallback.name()
                    );
                    self.fallback.generate(&request).await
                }
                other => other,
            }
        })
    }

    fn name(&self) -> &str {
        "fallback-chain"
    }
}

// ── Scripted provider ──────────────────────────────────────────────

/// Deterministic provider for tests: replies are popped from a queue in
/// order. An exhausted queue is a `ProviderUnavailable`, which exercises
/// the same failure paths a dead transport would.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<Value, PipelineError>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply (builder pattern).
    pub fn reply(self, value: Value) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(value));
        self
    }

    /// Queue an error reply (builder pattern).
    pub fn fail(self, error: PipelineError) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
        self
    }

    /// Number of unconsumed replies.
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Provider for ScriptedProvider {
    fn generate(&self, request: &GenerateRequest) -> ProviderFuture<'_> {
        let next = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        debug!("scripted provider serving reply for: {}", request.user);
        Box::pin(async move {
            next.unwrap_or_else(|| {
                Err(PipelineError::ProviderUnavailable(
                    "scripted provider exhausted".into(),
                ))
            })
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn choice_request() -> GenerateRequest {
        GenerateRequest::new(
            "classify",
            "open chrome",
            OutputShape::Choice(vec!["single".into(), "multi".into()]),
        )
    }

    #[tokio::test]
    async fn scripted_replies_in_order() {
        let provider = ScriptedProvider::new()
            .reply(json!("single"))
            .reply(json!("multi"));
        let req = choice_request();
        assert_eq!(provider.generate(&req).await.unwrap(), json!("single"));
        assert_eq!(provider.generate(&req).await.unwrap(), json!("multi"));
    }

    #[tokio::test]
    async fn exhausted_script_is_unavailable() {
        let provider = ScriptedProvider::new();
        let err = provider.generate(&choice_request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ProviderUnavailable(_)));
    }

    #[test]
    fn choice_shape_accepts_listed_token() {
        let shape = OutputShape::Choice(vec!["single".into(), "multi".into()]);
        assert!(check_shape(&shape, &json!("Single")).is_ok());
        assert!(check_shape(&shape, &json!("both")).is_err());
        assert!(check_shape(&shape, &json!(42)).is_err());
    }

    #[test]
    fn json_shape_validates_schema() {
        let shape = OutputShape::Json(json!({
            "type": "object",
            "properties": { "intent": { "type": "string" } },
            "required": ["intent"]
        }));
        assert!(check_shape(&shape, &json!({"intent": "file_operation"})).is_ok());
        let err = check_shape(&shape, &json!({"other": 1})).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaInvalid(_)));
    }

    #[tokio::test]
    async fn generate_checked_retries_once_then_succeeds() {
        let provider = ScriptedProvider::new()
            .reply(json!("maybe"))
            .reply(json!("multi"));
        let value = generate_checked(&provider, &choice_request()).await.unwrap();
        assert_eq!(value, json!("multi"));
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn generate_checked_fails_after_second_violation() {
        let provider = ScriptedProvider::new()
            .reply(json!("maybe"))
            .reply(json!("still wrong"));
        let err = generate_checked(&provider, &choice_request())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SchemaInvalid(_)));
    }

    #[tokio::test]
    async fn fallback_engages_on_unavailable() {
        let primary = ScriptedProvider::new().fail(PipelineError::ProviderUnavailable(
            "connection refused".into(),
        ));
        let secondary = ScriptedProvider::new().reply(json!("single"));
        let chain = FallbackProvider::new(Box::new(primary), Box::new(secondary));
        let value = chain.generate(&choice_request()).await.unwrap();
        assert_eq!(value, json!("single"));
    }

    #[tokio::test]
    async fn fallback_does_not_mask_schema_errors() {
        let primary =
            ScriptedProvider::new().fail(PipelineError::SchemaInvalid("junk".into()));
        let secondary = ScriptedProvider::new().reply(json!("single"));
        let chain = FallbackProvider::new(Box::new(primary), Box::new(secondary));
        let err = chain.generate(&choice_request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SchemaInvalid(_)));
    }
}
