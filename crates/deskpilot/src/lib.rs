//! Reasoning-and-planning core for a desktop automation assistant.
//!
//! `deskpilot` turns a natural-language utterance into a validated,
//! dependency-ordered sequence of deterministic tool invocations, executes
//! it, and surfaces a structured result. The pipeline is a chain of
//! single-authority stages:
//!
//! ```text
//! utterance
//!    │
//!    ▼
//! QueryClassifier ── single | multi
//!    │
//!    ├─ single ─► IntentClassifier ─► goal extraction ─┐
//!    │                                                 ▼
//!    └─ multi ──► GoalInterpreter ─► MetaGoal ─► GoalOrchestrator
//!                                                      │
//!                                                 PlanGraph
//!                                                      │
//!                                     ToolResolver ─► PlanExecutor
//! ```
//!
//! # Where to find things
//!
//! If you're looking for how to...
//!
//! - **Run a request end to end:** see [`Pipeline::process`](pipeline::Pipeline::process)
//!   and the [`RunResult`](pipeline::RunResult) it returns.
//! - **Route single vs multi:** [`QueryClassifier`](reason::QueryClassifier):
//!   deterministic marker scan first, strict two-token LLM fallback second.
//! - **Turn text into goals:** [`GoalInterpreter`](reason::GoalInterpreter);
//!   the scope grammar lives on [`Scope`](model::Scope) and dependency
//!   derivation is local, never model-driven.
//! - **Add a verb to the system:** edit
//!   [`PlannerRules::standard`](plan::rules::PlannerRules::standard); the
//!   planner body reads rule fields, it never branches on names.
//! - **Register a tool:** implement [`ToolExec`](tools::ToolExec), describe
//!   it with a [`Capability`](tools::Capability), and add it to the
//!   [`ToolRegistry`](tools::ToolRegistry) before the first request.
//! - **Bound which tools an intent may reach:** the domain tables in
//!   [`tools::resolve`]: preferred, allowed, and disallowed prefixes.
//! - **Swap the model backend:** implement [`Provider`](provider::Provider);
//!   see [`OpenRouterProvider`](provider::openrouter::OpenRouterProvider)
//!   and the test-oriented [`ScriptedProvider`](provider::ScriptedProvider).
//!
//! # Design principles
//!
//! 1. **One authority per concern.** The classifier owns routing, the
//!    interpreter owns goal structure, the planner owns action parameters,
//!    the resolver owns tool choice, and the path resolver owns path
//!    combination. Code that does two of these is a regression.
//!
//! 2. **Immutable stage boundaries.** Every value crossing a stage
//!    boundary is frozen at construction; planning and orchestration are
//!    pure functions of their inputs.
//!
//! 3. **Tables over branches.** Planner behavior and resolver domain
//!    locks are data. Adding behavior is a data edit, not new control
//!    flow.
//!
//! 4. **Domain-locked safety.** Raw input tools are opt-in through one
//!    intent; no fallback path crosses that line.
//!
//! 5. **Errors are values.** Stages log and return; the executor
//!    aggregates; one formatter produces user-visible text.

pub mod error;
pub mod exec;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod prelude;
pub mod provider;
pub mod reason;
pub mod tools;

use schemars::JsonSchema;

// Re-export schemars for downstream crates.
pub use schemars;

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between strong Rust types
/// and the schema-constrained provider calls.
///
/// # Example
///
/// ```
/// use deskpilot::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct LaunchArgs {
///     app: String,
/// }
///
/// let schema = json_schema_for::<LaunchArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"app".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}
