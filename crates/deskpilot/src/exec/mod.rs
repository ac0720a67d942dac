//! Plan execution: drives a resolved [`PlanGraph`] against the registry.
//!
//! One executor instance exists per plan execution — [`PlanExecutor::run`]
//! consumes `self`, so reuse is unrepresentable. Actions execute in
//! dependency waves: a wave's actions are independent and run
//! concurrently; wave N+1 starts only after wave N's statuses are known.
//! Preconditions come from capability records and are enforced here, in
//! code, never by prompt text.

use crate::error::PipelineError;
use crate::model::{PlanGraph, PlannedAction, WorldState, param_str};
use crate::tools::{Effect, Precondition, ToolInvocation, ToolRegistry};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cooperative cancel flag shared between a caller and one executor.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-plan execution knobs.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Wall-clock budget for the whole plan.
    pub deadline: Option<Duration>,
    /// External cancel signal.
    pub cancel: CancelSignal,
    /// The caller's explicit confirmation channel for destructive tools.
    pub confirm_destructive: bool,
    /// Pause inserted after a destructive action completes.
    pub destructive_cooldown: Duration,
    /// Per-tool invocation timeout.
    pub tool_timeout: Option<Duration>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            deadline: None,
            cancel: CancelSignal::new(),
            confirm_destructive: false,
            destructive_cooldown: Duration::from_millis(250),
            tool_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Terminal status of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failed,
    /// Skipped because a parent did not succeed.
    DependencyFailed,
    /// Never started: cancel or deadline.
    Cancelled,
}

/// Recorded result for one action, keyed by its id in the report.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub action_id: String,
    /// Resolved tool name; `None` for context-only actions.
    pub tool: Option<String>,
    pub status: ActionStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal status of a whole plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Success,
    Partial,
    Failed,
    Blocked,
}

/// The executor's aggregate result.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub final_status: FinalStatus,
    /// Per-action outcomes in execution order.
    pub outcomes: Vec<ActionOutcome>,
    /// Session bound at plan start, if any tool needed one.
    pub session_id: Option<String>,
}

impl ExecutionReport {
    pub fn completed_action_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.status == ActionStatus::Success)
            .map(|o| o.action_id.as_str())
            .collect()
    }
}

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Drives one plan to completion. Constructed per plan; `run` consumes it.
pub struct PlanExecutor {
    registry: Arc<ToolRegistry>,
    options: ExecutorOptions,
}

impl PlanExecutor {
    pub fn new(registry: Arc<ToolRegistry>, options: ExecutorOptions) -> Self {
        Self { registry, options }
    }

    /// Execute the graph. `resolution` maps each non-context action id to
    /// its resolved tool name (produced by the resolver; never modified
    /// here).
    pub async fn run(
        self,
        graph: &PlanGraph,
        resolution: &HashMap<String, String>,
        world: &WorldState,
    ) -> ExecutionReport {
        let started = Instant::now();
        let session_id = self.acquire_session(graph, resolution);
        let mut statuses: HashMap<String, ActionStatus> = HashMap::new();
        let mut outcomes: Vec<ActionOutcome> = Vec::new();
        let mut modifiers_held = false;
        let mut cancelled = false;

        for wave in graph.waves() {
            // Partition the wave before running it: actions whose parents
            // failed are recorded without starting.
            let mut runnable: Vec<&PlannedAction> = Vec::new();
            for action_id in &wave {
                let action = graph
                    .node(action_id)
                    .expect("wave ids come from the graph");
                if self.out_of_time(started) {
                    cancelled = true;
                    outcomes.push(cancelled_outcome(action));
                    statuses.insert(action.action_id.clone(), ActionStatus::Cancelled);
                    continue;
                }
                let failed_parent = graph
                    .parents_of(action_id)
                    .iter()
                    .find(|p| statuses.get(*p) != Some(&ActionStatus::Success));
                if let Some(parent) = failed_parent {
                    debug!("{action_id} skipped: parent {parent} did not succeed");
                    outcomes.push(ActionOutcome {
                        action_id: action.action_id.clone(),
                        tool: resolution.get(action_id).cloned(),
                        status: ActionStatus::DependencyFailed,
                        message: format!("parent {parent} did not succeed"),
                        error: Some("dependency_failed".into()),
                    });
                    statuses.insert(action.action_id.clone(), ActionStatus::DependencyFailed);
                    continue;
                }
                runnable.push(action);
            }

            // Independent siblings run concurrently; each writes only its
            // own outcome.
            let futures: Vec<_> = runnable
                .iter()
                .map(|action| self.run_action(action, resolution, world, session_id.as_deref()))
                .collect();
            let wave_outcomes = futures::future::join_all(futures).await;

            let mut destructive_ran = false;
            for (action, outcome) in runnable.iter().zip(wave_outcomes) {
                if let Some(tool) = resolution.get(&action.action_id)
                    && let Some(capability) = self.registry.get(tool)
                {
                    if capability.effects.contains(&Effect::HoldsModifiers) {
                        modifiers_held = true;
                    }
                    if capability.is_destructive && outcome.status == ActionStatus::Success {
                        destructive_ran = true;
                    }
                }
                if outcome.status != ActionStatus::Success && modifiers_held {
                    release_modifiers(&mut modifiers_held);
                }
                statuses.insert(action.action_id.clone(), outcome.status);
                outcomes.push(outcome);
            }

            if destructive_ran && !self.options.destructive_cooldown.is_zero() {
                tokio::time::sleep(self.options.destructive_cooldown).await;
            }
            if self.options.cancel.is_cancelled() {
                cancelled = true;
            }
        }

        // Teardown: whatever happened above, held modifiers are released
        // and the plan-scoped session ends with the executor.
        if modifiers_held {
            release_modifiers(&mut modifiers_held);
        }
        if let Some(session) = &session_id {
            debug!("session {session} closed with plan");
        }

        let final_status = aggregate(&outcomes, cancelled);
        info!(
            "plan finished: {:?} ({} actions, {:.0}ms)",
            final_status,
            outcomes.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        ExecutionReport {
            final_status,
            outcomes,
            session_id,
        }
    }

    /// Acquire the plan-scoped session once, before the first action, if
    /// any resolved tool needs one. Tools never create sessions mid-plan.
    fn acquire_session(
        &self,
        graph: &PlanGraph,
        resolution: &HashMap<String, String>,
    ) -> Option<String> {
        let needs_session = graph.nodes().iter().any(|action| {
            resolution
                .get(&action.action_id)
                .and_then(|tool| self.registry.get(tool))
                .is_some_and(|c| c.requires_session)
        });
        needs_session.then(|| {
            let id = format!("sess-{}", SESSION_COUNTER.fetch_add(1, Ordering::SeqCst));
            info!("acquired session {id} for plan");
            id
        })
    }

    async fn run_action(
        &self,
        action: &PlannedAction,
        resolution: &HashMap<String, String>,
        world: &WorldState,
        session_id: Option<&str>,
    ) -> ActionOutcome {
        if self.options.cancel.is_cancelled() {
            return cancelled_outcome(action);
        }

        // Context-only actions carry no tool; their effect was the frame
        // they produced at planning time.
        if action.semantic_only {
            return ActionOutcome {
                action_id: action.action_id.clone(),
                tool: None,
                status: ActionStatus::Success,
                message: "context recorded".into(),
                error: None,
            };
        }

        let Some(tool) = resolution.get(&action.action_id) else {
            return failed_outcome(
                action,
                None,
                PipelineError::NoTool {
                    intent: action.intent.tag().to_string(),
                    description: action.description.clone(),
                },
            );
        };

        if let Some(error) = self.check_preconditions(action, tool, world) {
            return failed_outcome(action, Some(tool.clone()), error);
        }

        if self.already_satisfied(action, world) {
            return ActionOutcome {
                action_id: action.action_id.clone(),
                tool: Some(tool.clone()),
                status: ActionStatus::Success,
                message: "already satisfied".into(),
                error: None,
            };
        }

        // The planner's args pass through untouched; the session rides
        // alongside them instead of being injected into the map.
        let invocation = ToolInvocation {
            args: action.args.clone(),
            session_id: session_id.map(str::to_string),
        };
        let invoke = self.registry.invoke(tool, invocation);
        let outcome = match self.options.tool_timeout {
            Some(limit) => match tokio::time::timeout(limit, invoke).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("{} timed out after {limit:?}", action.action_id);
                    return failed_outcome(
                        action,
                        Some(tool.clone()),
                        PipelineError::ToolFailure {
                            tool: tool.clone(),
                            message: format!("timed out after {limit:?}"),
                        },
                    );
                }
            },
            None => invoke.await,
        };

        if outcome.is_success() {
            ActionOutcome {
                action_id: action.action_id.clone(),
                tool: Some(tool.clone()),
                status: ActionStatus::Success,
                message: outcome.message,
                error: None,
            }
        } else {
            failed_outcome(
                action,
                Some(tool.clone()),
                PipelineError::ToolFailure {
                    tool: tool.clone(),
                    message: outcome.message,
                },
            )
        }
    }

    /// Enforce the tool's declared preconditions against the snapshot.
    fn check_preconditions(
        &self,
        action: &PlannedAction,
        tool: &str,
        world: &WorldState,
    ) -> Option<PipelineError> {
        let capability = self.registry.get(tool)?;
        for precondition in &capability.preconditions {
            let met = match precondition {
                Precondition::RequiresFocus => world.focused_window.is_some(),
                Precondition::RequiresActiveApp => param_str(&action.args, "app")
                    .map(|app| world.is_running(&app))
                    .unwrap_or(false),
                Precondition::RequiresUnlockedScreen => !world.screen_locked,
            };
            if !met {
                return Some(PipelineError::PreconditionUnmet {
                    action_id: action.action_id.clone(),
                    precondition: precondition.to_string(),
                });
            }
        }
        if capability.is_destructive && !self.options.confirm_destructive {
            return Some(PipelineError::PreconditionUnmet {
                action_id: action.action_id.clone(),
                precondition: "destructive action not confirmed".into(),
            });
        }
        None
    }

    /// Hook for a pre-execution satisfaction check ("is the effect already
    /// true?"). Deliberately inert for now.
    fn already_satisfied(&self, _action: &PlannedAction, _world: &WorldState) -> bool {
        false
    }

    fn out_of_time(&self, started: Instant) -> bool {
        if self.options.cancel.is_cancelled() {
            return true;
        }
        self.options
            .deadline
            .is_some_and(|d| started.elapsed() >= d)
    }
}

fn release_modifiers(held: &mut bool) {
    if *held {
        info!("released held modifier keys");
        *held = false;
    }
}

fn cancelled_outcome(action: &PlannedAction) -> ActionOutcome {
    ActionOutcome {
        action_id: action.action_id.clone(),
        tool: None,
        status: ActionStatus::Cancelled,
        message: "not started: plan cancelled".into(),
        error: Some(PipelineError::Cancelled.kind().into()),
    }
}

fn failed_outcome(
    action: &PlannedAction,
    tool: Option<String>,
    error: PipelineError,
) -> ActionOutcome {
    warn!("{} failed: {error}", action.action_id);
    ActionOutcome {
        action_id: action.action_id.clone(),
        tool,
        status: ActionStatus::Failed,
        message: error.to_string(),
        error: Some(error.kind().into()),
    }
}

fn aggregate(outcomes: &[ActionOutcome], cancelled: bool) -> FinalStatus {
    if outcomes.is_empty() {
        return FinalStatus::Blocked;
    }
    let successes = outcomes
        .iter()
        .filter(|o| o.status == ActionStatus::Success)
        .count();
    if cancelled {
        return FinalStatus::Partial;
    }
    if successes == outcomes.len() {
        FinalStatus::Success
    } else if successes == 0 {
        FinalStatus::Failed
    } else {
        FinalStatus::Partial
    }
}
