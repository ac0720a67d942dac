//! The closed error set shared by every pipeline stage.
//!
//! Errors are values on return paths — a stage logs, wraps, and returns;
//! nothing throws across a stage boundary. The orchestrator and executor
//! aggregate these into a terminal status, and only the response formatter
//! turns them into user-facing prose.

use thiserror::Error;

/// Every failure the reasoning-and-planning core can produce.
///
/// The set is closed on purpose: downstream code matches exhaustively, so
/// adding a variant is a deliberate, compiler-checked change.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Transport or authentication failure talking to the LLM provider.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider output failed structural validation against the declared
    /// schema or enum.
    #[error("provider output failed schema validation: {0}")]
    SchemaInvalid(String),

    /// The interpreter could not derive a meta-structure for the utterance.
    #[error("could not derive goal structure: {0}")]
    AmbiguousUtterance(String),

    /// The planner has no rule for this `(domain, verb)` pair.
    #[error("no capability for {domain}.{verb}")]
    NoCapability { domain: String, verb: String },

    /// A required parameter was missing or outside its allowed values.
    /// The planner fails fast rather than guessing.
    #[error("parameter validation failed for {domain}.{verb}: {reason}")]
    ValidationFailed {
        domain: String,
        verb: String,
        reason: String,
    },

    /// The resolver found no tool inside the intent's allowed domains.
    #[error("no tool for intent '{intent}' matching '{description}'")]
    NoTool {
        intent: String,
        description: String,
    },

    /// An executor-enforced precondition (focus, active app, unlocked
    /// screen, destructive confirmation) was not met.
    #[error("precondition unmet for action {action_id}: {precondition}")]
    PreconditionUnmet {
        action_id: String,
        precondition: String,
    },

    /// The tool itself reported `status = "error"`.
    #[error("tool {tool} failed: {message}")]
    ToolFailure { tool: String, message: String },

    /// The request was cancelled or timed out.
    #[error("request cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Short stable tag for logs and machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ProviderUnavailable(_) => "provider_unavailable",
            PipelineError::SchemaInvalid(_) => "schema_invalid",
            PipelineError::AmbiguousUtterance(_) => "ambiguous_utterance",
            PipelineError::NoCapability { .. } => "no_capability",
            PipelineError::ValidationFailed { .. } => "validation_failed",
            PipelineError::NoTool { .. } => "no_tool",
            PipelineError::PreconditionUnmet { .. } => "precondition_unmet",
            PipelineError::ToolFailure { .. } => "tool_failure",
            PipelineError::Cancelled => "cancelled",
        }
    }
}
