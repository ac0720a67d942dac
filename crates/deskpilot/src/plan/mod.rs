//! Per-goal planning, orchestration, and path resolution.

pub mod orchestrate;
pub mod path;
pub mod rules;

pub use orchestrate::{GoalOrchestrator, OrchestrationResult, OrchestrationStatus};
pub use path::PathResolver;
pub use rules::{PlannerRule, PlannerRules};

use crate::model::{
    ActionClass, ContextFrame, Goal, Params, Plan, PlannedAction, WorldState, param_str,
};
use rules::render_template;
use tracing::{debug, warn};

/// Outcome of planning one goal.
#[derive(Debug)]
pub enum PlanResult {
    Planned {
        plan: Plan,
        frames: Vec<ContextFrame>,
    },
    /// No rule for this `(domain, verb)`.
    NoCapability { domain: String, verb: String },
    /// A required param was missing or outside its allowed values.
    ValidationFailed {
        domain: String,
        verb: String,
        reason: String,
    },
}

/// Table-driven planner: one goal in, a minimal validated plan out.
///
/// The emitted action's `args` are the final parameter set for the tool
/// call: nothing downstream may add, rewrite, or drop a key. The planner
/// body branches only on rule fields, never on domain or verb names.
pub struct GoalPlanner {
    rules: PlannerRules,
}

impl GoalPlanner {
    pub fn new(rules: PlannerRules) -> Self {
        Self { rules }
    }

    pub fn standard() -> Self {
        Self::new(PlannerRules::standard())
    }

    /// Plan one goal against the rules table. `frames` are the context
    /// frames accumulated from earlier goals, most recent last.
    pub fn plan(&self, goal: &Goal, _world: &WorldState, frames: &[ContextFrame]) -> PlanResult {
        let Some(rule) = self.rules.get(&goal.domain, &goal.verb) else {
            warn!("no planning rule for {}.{}", goal.domain, goal.verb);
            return PlanResult::NoCapability {
                domain: goal.domain.clone(),
                verb: goal.verb.clone(),
            };
        };

        // Assemble the working param map: defaults under the goal's own
        // params, context fills for what is still missing. Explicit user
        // params always win.
        let mut params = goal.params.clone();
        for (key, value) in rule.default_params {
            params
                .entry((*key).to_string())
                .or_insert_with(|| serde_json::Value::String((*value).to_string()));
        }
        for binding in rule.context_consumption {
            if params.contains_key(binding.param) {
                continue;
            }
            if let Some(value) = frames
                .iter()
                .rev()
                .find(|f| f.domain == binding.domain && f.data.contains_key(binding.key))
                .and_then(|f| f.data.get(binding.key).cloned())
            {
                debug!(
                    "filled '{}' for {}.{} from context frame",
                    binding.param, goal.domain, goal.verb
                );
                params.insert(binding.param.to_string(), value);
            }
        }
        // The orchestrator's resolved path is authoritative for file
        // domains; the raw param was only an identity name.
        if let Some(resolved) = &goal.resolved_path {
            params.insert(
                "path".to_string(),
                serde_json::Value::String(resolved.clone()),
            );
        }

        // Validate required presence, then allowed values. Fail fast;
        // a missing param is never guessed.
        let missing: Vec<&str> = rule
            .required_params
            .iter()
            .copied()
            .filter(|key| !params.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            if rule.allow_semantic_only {
                return self.plan_semantic_only(goal, rule, &params);
            }
            return PlanResult::ValidationFailed {
                domain: goal.domain.clone(),
                verb: goal.verb.clone(),
                reason: format!("missing required params: {}", missing.join(", ")),
            };
        }
        for (key, allowed) in rule.allowed_values {
            let value = param_str(&params, key).unwrap_or_default();
            if !allowed.contains(&value.as_str()) {
                return PlanResult::ValidationFailed {
                    domain: goal.domain.clone(),
                    verb: goal.verb.clone(),
                    reason: format!(
                        "param '{key}' value '{value}' not in {allowed:?}"
                    ),
                };
            }
        }

        let description = match render_template(rule.description_template, &params) {
            Ok(d) => d,
            Err(reason) => {
                return PlanResult::ValidationFailed {
                    domain: goal.domain.clone(),
                    verb: goal.verb.clone(),
                    reason,
                };
            }
        };

        let action_id = format!("{}_a1", goal.goal_id);
        let action = PlannedAction {
            action_id: action_id.clone(),
            intent: rule.intent,
            description,
            args: params,
            action_class: rule.action_class,
            semantic_only: false,
        };
        let frames = self.produced_frames(rule, &action);
        debug!(
            "planned {}.{} -> {} ({})",
            goal.domain, goal.verb, action.action_id, action.description
        );
        let plan = Plan::new(vec![action], action_id)
            .expect("single-action plan always names its own action");
        PlanResult::Planned { plan, frames }
    }

    /// A rule that allows semantic-only acceptance emits a context-only
    /// observe action: no tool is ever resolved for it.
    fn plan_semantic_only(
        &self,
        goal: &Goal,
        rule: &PlannerRule,
        params: &Params,
    ) -> PlanResult {
        let action_id = format!("{}_a1", goal.goal_id);
        let label = goal
            .object
            .clone()
            .or_else(|| param_str(params, "target"))
            .unwrap_or_else(|| goal.domain.clone());
        let action = PlannedAction {
            action_id: action_id.clone(),
            intent: rule.intent,
            description: format!("{}:{label}", goal.verb),
            args: params.clone(),
            action_class: ActionClass::Observe,
            semantic_only: true,
        };
        let frames = self.produced_frames(rule, &action);
        debug!(
            "planned {}.{} as semantic-only context action",
            goal.domain, goal.verb
        );
        let plan = Plan::new(vec![action], action_id)
            .expect("single-action plan always names its own action");
        PlanResult::Planned { plan, frames }
    }

    fn produced_frames(&self, rule: &PlannerRule, action: &PlannedAction) -> Vec<ContextFrame> {
        let Some(production) = &rule.context_production else {
            return Vec::new();
        };
        let mut data = Params::new();
        for key in production.keys {
            if let Some(value) = action.args.get(*key) {
                data.insert((*key).to_string(), value.clone());
            }
        }
        vec![ContextFrame {
            produced_by: action.action_id.clone(),
            domain: production.domain.to_string(),
            data,
        }]
    }
}

impl Default for GoalPlanner {
    fn default() -> Self {
        Self::standard()
    }
}
