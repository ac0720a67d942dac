//! Tool capabilities, the registry, and dispatch.
//!
//! A tool is a named, atomic capability: a [`Capability`] record (metadata
//! the planner, resolver, and executor read) plus a [`ToolExec`]
//! implementation (the async body). The [`ToolRegistry`] is populated once
//! at process start and is read-only from the core's perspective; dispatch
//! validates arguments against the tool's declared JSON Schema before the
//! body runs.

pub mod builtin;
pub mod resolve;

use crate::model::{Intent, Params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, trace};

/// Boxed future returned by [`ToolExec::invoke`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolOutcome> + Send + 'a>>;

/// Executor-enforced requirements a tool declares statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// A window must have focus.
    RequiresFocus,
    /// The application named in `args.app` must be running.
    RequiresActiveApp,
    /// The screen must be unlocked.
    RequiresUnlockedScreen,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::RequiresFocus => write!(f, "requires_focus"),
            Precondition::RequiresActiveApp => write!(f, "requires_active_app"),
            Precondition::RequiresUnlockedScreen => write!(f, "requires_unlocked_screen"),
        }
    }
}

/// Side effects a tool declares statically. The executor uses these for
/// side-effect tracking (modifier release, destructive cooldowns); the
/// resolver's similarity stage scores against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    CreatesEntry,
    RemovesEntry,
    LaunchesApp,
    EmitsInput,
    /// May leave modifier keys held; the executor guarantees release.
    HoldsModifiers,
    ChangesAudio,
    LocksScreen,
    NavigatesBrowser,
}

/// Registered metadata for one tool.
#[derive(Debug, Clone)]
pub struct Capability {
    /// Dot-separated name (`files.create_folder`, `system.input.mouse.click`).
    pub name: String,
    /// Intents this tool naturally serves.
    pub intent_tags: Vec<Intent>,
    pub preconditions: Vec<Precondition>,
    pub effects: Vec<Effect>,
    /// Destructive tools require an explicit confirmation channel.
    pub is_destructive: bool,
    /// Needs the plan-scoped session acquired at plan start.
    pub requires_session: bool,
    /// JSON Schema for the argument map.
    pub schema: serde_json::Value,
}

impl Capability {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            intent_tags: Vec::new(),
            preconditions: Vec::new(),
            effects: Vec::new(),
            is_destructive: false,
            requires_session: false,
            schema,
        }
    }

    pub fn intents(mut self, tags: &[Intent]) -> Self {
        self.intent_tags = tags.to_vec();
        self
    }

    pub fn preconditions(mut self, preconditions: &[Precondition]) -> Self {
        self.preconditions = preconditions.to_vec();
        self
    }

    pub fn effects(mut self, effects: &[Effect]) -> Self {
        self.effects = effects.to_vec();
        self
    }

    pub fn destructive(mut self) -> Self {
        self.is_destructive = true;
        self
    }

    pub fn session_bound(mut self) -> Self {
        self.requires_session = true;
        self
    }
}

/// Structured result from one tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

impl ToolOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            status: ToolStatus::Success,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Everything a tool body receives: the planner's authoritative argument
/// map (owned, never rewritten) and the plan-scoped session id, if one
/// was acquired at plan start.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub args: Params,
    pub session_id: Option<String>,
}

/// The async body of one tool. Atomic: no internal retries or loops.
pub trait ToolExec: Send + Sync {
    fn invoke(&self, invocation: ToolInvocation) -> ToolFuture<'_>;
}

struct RegisteredTool {
    capability: Capability,
    exec: Box<dyn ToolExec>,
}

/// Name-keyed collection of tools, populated before the first request.
pub struct ToolRegistry {
    entries: HashMap<String, RegisteredTool>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, capability: Capability, exec: impl ToolExec + 'static) {
        self.entries.insert(
            capability.name.clone(),
            RegisteredTool {
                capability,
                exec: Box::new(exec),
            },
        );
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, capability: Capability, exec: impl ToolExec + 'static) -> Self {
        self.register(capability, exec);
        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name).map(|t| &t.capability)
    }

    /// Capabilities whose names start with `prefix`, in name order.
    pub fn list_by_prefix(&self, prefix: &str) -> Vec<&Capability> {
        let mut found: Vec<&Capability> = self
            .entries
            .values()
            .map(|t| &t.capability)
            .filter(|c| c.name.starts_with(prefix))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    pub fn list_all(&self) -> Vec<&Capability> {
        let mut all: Vec<&Capability> = self.entries.values().map(|t| &t.capability).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatch by name: validate args against the declared schema, then
    /// run the body. Unknown names and schema mismatches come back as
    /// error outcomes, not panics.
    pub async fn invoke(&self, name: &str, invocation: ToolInvocation) -> ToolOutcome {
        let Some(tool) = self.entries.get(name) else {
            return ToolOutcome::err(format!("unknown tool '{name}'"));
        };

        if let Some(error) = validate_args(&tool.capability, &invocation.args) {
            return ToolOutcome::err(error);
        }

        let preview: String = serde_json::Value::Object(invocation.args.clone())
            .to_string()
            .chars()
            .take(120)
            .collect();
        info!("[tool] {name}({preview})");
        let start = std::time::Instant::now();
        let outcome = tool.exec.invoke(invocation).await;
        debug!(
            "[tool] {name} finished in {:.0}ms ({:?})",
            start.elapsed().as_secs_f64() * 1000.0,
            outcome.status
        );
        trace!("[tool] {name} message: {}", outcome.message);
        outcome
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate an argument map against a capability's JSON Schema.
/// Returns `None` if valid, `Some(reason)` otherwise.
fn validate_args(capability: &Capability, args: &Params) -> Option<String> {
    let validator = match jsonschema::validator_for(&capability.schema) {
        Ok(v) => v,
        Err(_) => return None, // Unverifiable schema: let the body decide.
    };
    let value = serde_json::Value::Object(args.clone());
    let errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| format!("{}: {e}", e.instance_path()))
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "invalid arguments for '{}': {}",
            capability.name,
            errors.join("; ")
        ))
    }
}
