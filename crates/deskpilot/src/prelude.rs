//! Convenience re-exports for embedding the pipeline.
//!
//! Meant to be glob-imported:
//!
//! ```ignore
//! use deskpilot::prelude::*;
//! ```
//!
//! This pulls in the types needed by the vast majority of callers: the
//! pipeline and its result, the provider trait and implementations, the
//! registry and capability types, and the executor options. Stage-level
//! internals (planner rules, resolver tables, graph internals) are
//! intentionally excluded; import those from their modules directly.

// ── Pipeline ────────────────────────────────────────────────────────
pub use crate::pipeline::{Pipeline, PipelineConfig, RunResult, render_summary};

// ── Model ───────────────────────────────────────────────────────────
pub use crate::error::PipelineError;
pub use crate::model::{
    Classification, Goal, Intent, MetaGoal, Scope, Utterance, WorldState, WorldStateProvider,
};

// ── Providers ───────────────────────────────────────────────────────
pub use crate::provider::openrouter::{DEFAULT_MODEL, OpenRouterProvider};
pub use crate::provider::{FallbackProvider, Provider, ScriptedProvider};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::json_schema_for;
pub use crate::tools::builtin::{ActionRecorder, standard_registry};
pub use crate::tools::{Capability, ToolExec, ToolOutcome, ToolRegistry};

// ── Execution ───────────────────────────────────────────────────────
pub use crate::exec::{CancelSignal, ExecutorOptions, FinalStatus};
