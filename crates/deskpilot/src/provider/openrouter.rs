//! HTTP provider for the OpenRouter chat completions API.
//!
//! One request shape: system + user message, optional JSON-schema response
//! format, temperature pinned low. Send failures are classified where they
//! occur into a typed [`SendErrorKind`], and only rate limiting, server
//! errors, and transport failures are retried, on a fixed
//! [`RetrySchedule`]. Client errors (400/401/403) and protocol errors
//! surface immediately.

use super::{GenerateRequest, OutputShape, Provider, ProviderFuture};
use crate::error::PipelineError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for all pipeline calls.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

// ── Send errors ────────────────────────────────────────────────────

/// Where a send attempt failed. The kind decides retryability; nothing
/// downstream inspects error text.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SendErrorKind {
    /// The request never completed (connect, TLS, timeout, read).
    Transport,
    /// The server answered with a non-success status.
    Http(u16),
    /// The body arrived but was not a usable completion (API error
    /// envelope, missing choices, unreadable JSON).
    Protocol,
}

#[derive(Debug)]
struct SendError {
    kind: SendErrorKind,
    detail: String,
}

impl SendError {
    fn transport(detail: impl Into<String>) -> Self {
        Self {
            kind: SendErrorKind::Transport,
            detail: detail.into(),
        }
    }

    fn http(status: u16, detail: impl Into<String>) -> Self {
        Self {
            kind: SendErrorKind::Http(status),
            detail: detail.into(),
        }
    }

    fn protocol(detail: impl Into<String>) -> Self {
        Self {
            kind: SendErrorKind::Protocol,
            detail: detail.into(),
        }
    }

    /// Transport failures and 429/5xx responses may succeed on a later
    /// attempt. Client errors and malformed replies will not.
    fn retryable(&self) -> bool {
        match self.kind {
            SendErrorKind::Transport => true,
            SendErrorKind::Http(status) => status == 429 || (500..600).contains(&status),
            SendErrorKind::Protocol => false,
        }
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SendErrorKind::Transport => write!(f, "transport: {}", self.detail),
            SendErrorKind::Http(status) => write!(f, "HTTP {status}: {}", self.detail),
            SendErrorKind::Protocol => write!(f, "protocol: {}", self.detail),
        }
    }
}

// ── Retry schedule ─────────────────────────────────────────────────

/// Retry timing as data: one delay per retry, in order. An empty
/// schedule means a single attempt. The default staggers 0.4s / 1.5s /
/// 4s, which rides out a rate-limit window without holding a request
/// hostage.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_millis(400),
                Duration::from_millis(1500),
                Duration::from_secs(4),
            ],
        }
    }
}

impl RetrySchedule {
    /// No retries: fail on the first error.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    /// An explicit delay list.
    pub fn of(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// The wait before retry number `attempt` (0-indexed), or `None` when
    /// the schedule is exhausted.
    pub fn delay_before_retry(&self, attempt: usize) -> Option<Duration> {
        self.delays.get(attempt).copied()
    }

    pub fn max_retries(&self) -> usize {
        self.delays.len()
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async provider over the OpenRouter chat completions endpoint.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetrySchedule,
}

impl OpenRouterProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .user_agent("deskpilot/0.2")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| {
                PipelineError::ProviderUnavailable(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENROUTER_URL.to_string(),
            retry: RetrySchedule::default(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetrySchedule) -> Self {
        self.retry = retry;
        self
    }

    /// Point at a different endpoint (local inference servers speak the
    /// same protocol).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn body_for(&self, request: &GenerateRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if let OutputShape::Json(schema) = &request.shape {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": "output", "strict": true, "schema": schema },
            });
        }
        body
    }

    async fn send_once(&self, request: &GenerateRequest) -> Result<String, SendError> {
        let resp = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.body_for(request))
            .send()
            .await
            .map_err(|e| SendError::transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| SendError::transport(format!("failed to read response: {e}")))?;
        debug!("provider response: HTTP {status} ({} bytes)", text.len());

        if !status.is_success() {
            return Err(SendError::http(status.as_u16(), text));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| SendError::protocol(format!("unparseable response body: {e}")))?;
        if let Some(err) = parsed.error {
            return Err(SendError::protocol(format!("API error: {}", err.message)));
        }
        parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .ok_or_else(|| SendError::protocol("empty completion"))
    }
}

impl Provider for OpenRouterProvider {
    fn generate(&self, request: &GenerateRequest) -> ProviderFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let mut attempt = 0;
            let content = loop {
                match self.send_once(&request).await {
                    Ok(content) => break content,
                    Err(e) if e.retryable() => {
                        let Some(delay) = self.retry.delay_before_retry(attempt) else {
                            return Err(PipelineError::ProviderUnavailable(format!(
                                "{e} (after {} retries)",
                                self.retry.max_retries()
                            )));
                        };
                        warn!(
                            "retryable provider error (attempt {}/{}): {e}; waiting {delay:?}",
                            attempt + 1,
                            self.retry.max_retries()
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(PipelineError::ProviderUnavailable(e.to_string())),
                }
            };
            parse_content(&request.shape, &content)
        })
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

/// Turn the raw completion text into the value shape the caller expects.
fn parse_content(shape: &OutputShape, content: &str) -> Result<Value, PipelineError> {
    match shape {
        OutputShape::Text => Ok(Value::String(content.to_string())),
        OutputShape::Choice(_) => Ok(Value::String(
            content.trim().trim_matches('"').to_lowercase(),
        )),
        OutputShape::Json(_) => {
            // Models occasionally wrap JSON in a code fence.
            let stripped = content
                .trim()
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim();
            serde_json::from_str(stripped)
                .map_err(|e| PipelineError::SchemaInvalid(format!("unparseable JSON output: {e}")))
        }
    }
}

#[derive(Deserialize)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<RawError>,
}

#[derive(Deserialize)]
struct RawChoice {
    message: RawMessage,
}

#[derive(Deserialize)]
struct RawMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct RawError {
    message: String,
}
