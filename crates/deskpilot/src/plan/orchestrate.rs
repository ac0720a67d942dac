//! Assembly of per-goal plans into one executable graph.
//!
//! The orchestrator schedules goals topologically, runs path resolution
//! for file-domain goals, invokes the planner per goal while threading
//! context frames forward, and assembles the resulting actions into a
//! validated [`PlanGraph`]. A goal that fails to plan takes its
//! descendants with it; everything else still ships.

use super::path::PathResolver;
use super::{GoalPlanner, PlanResult};
use crate::error::PipelineError;
use crate::model::{ContextFrame, MetaGoal, PlanGraph, PlannedAction, WorldState};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Terminal status of an orchestration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationStatus {
    /// Every goal planned.
    Success,
    /// Some goals planned, some failed.
    Partial,
    /// Nothing planned.
    Blocked,
}

/// One goal that could not be planned.
#[derive(Debug, Clone)]
pub struct FailedGoal {
    pub index: usize,
    pub goal_id: String,
    pub error: PipelineError,
}

/// The orchestrator's output bundle.
#[derive(Debug)]
pub struct OrchestrationResult {
    pub status: OrchestrationStatus,
    /// Present unless everything was blocked.
    pub plan_graph: Option<PlanGraph>,
    pub failed_goals: Vec<FailedGoal>,
    /// Context frames produced during planning, in production order.
    pub frames: Vec<ContextFrame>,
}

/// Combines per-goal plans into a `PlanGraph`. Owns the planner; path
/// combination happens only in the [`PathResolver`] it calls.
pub struct GoalOrchestrator {
    planner: GoalPlanner,
}

impl GoalOrchestrator {
    pub fn new(planner: GoalPlanner) -> Self {
        Self { planner }
    }

    pub fn standard() -> Self {
        Self::new(GoalPlanner::standard())
    }

    /// Plan every goal of a meta-goal and assemble the graph.
    pub fn assemble(&self, meta: &MetaGoal, world: &WorldState) -> OrchestrationResult {
        let order = topological_goal_order(meta);

        let mut frames: Vec<ContextFrame> = Vec::new();
        let mut failed: Vec<FailedGoal> = Vec::new();
        let mut failed_set: HashSet<usize> = HashSet::new();
        let mut resolved_paths: HashMap<usize, String> = HashMap::new();
        // Planned actions per goal index, in goal order.
        let mut planned: BTreeMap<usize, Vec<PlannedAction>> = BTreeMap::new();

        for &index in &order {
            // A failed parent transitively fails this goal before any
            // planning work happens.
            if let Some(&parent) = meta
                .parents_of(index)
                .iter()
                .find(|p| failed_set.contains(*p))
            {
                warn!(
                    "goal {} skipped: parent g{parent} failed",
                    meta.goals[index].goal_id
                );
                failed_set.insert(index);
                failed.push(FailedGoal {
                    index,
                    goal_id: meta.goals[index].goal_id.clone(),
                    error: PipelineError::ValidationFailed {
                        domain: meta.goals[index].domain.clone(),
                        verb: meta.goals[index].verb.clone(),
                        reason: format!("parent goal g{parent} failed"),
                    },
                });
                continue;
            }

            // Work on an owned copy: the meta-goal itself stays frozen.
            let mut goal = meta.goals[index].clone();
            if goal.is_file_domain() {
                let parent_path = meta
                    .parents_of(index)
                    .first()
                    .and_then(|p| resolved_paths.get(p))
                    .map(String::as_str);
                let resolved = PathResolver::resolve(&goal, parent_path, world);
                resolved_paths.insert(index, resolved.clone());
                goal.resolved_path = Some(resolved);
            }

            match self.planner.plan(&goal, world, &frames) {
                PlanResult::Planned {
                    plan,
                    frames: produced,
                } => {
                    debug!("goal {} planned ({} actions)", goal.goal_id, plan.total_actions);
                    planned.insert(index, plan.actions);
                    frames.extend(produced);
                }
                PlanResult::NoCapability { domain, verb } => {
                    failed_set.insert(index);
                    failed.push(FailedGoal {
                        index,
                        goal_id: goal.goal_id.clone(),
                        error: PipelineError::NoCapability { domain, verb },
                    });
                }
                PlanResult::ValidationFailed {
                    domain,
                    verb,
                    reason,
                } => {
                    failed_set.insert(index);
                    failed.push(FailedGoal {
                        index,
                        goal_id: goal.goal_id.clone(),
                        error: PipelineError::ValidationFailed {
                            domain,
                            verb,
                            reason,
                        },
                    });
                }
            }
        }

        let status = if failed.is_empty() {
            OrchestrationStatus::Success
        } else if planned.is_empty() {
            OrchestrationStatus::Blocked
        } else {
            OrchestrationStatus::Partial
        };

        let plan_graph = if planned.is_empty() {
            None
        } else {
            Some(build_graph(meta, &planned))
        };

        OrchestrationResult {
            status,
            plan_graph,
            failed_goals: failed,
            frames,
        }
    }
}

impl Default for GoalOrchestrator {
    fn default() -> Self {
        Self::standard()
    }
}

/// Stable topological order over goal indices. Dependencies always point
/// backward, so ascending index order already respects them; this keeps
/// the explicit sort for the day that invariant is relaxed.
fn topological_goal_order(meta: &MetaGoal) -> Vec<usize> {
    let n = meta.goals.len();
    let mut in_degree: Vec<usize> = vec![0; n];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (&child, parents) in &meta.dependencies {
        in_degree[child] = parents.len();
        for &parent in parents {
            children[parent].push(child);
        }
    }
    let mut ready: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &child in &children[i] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                let pos = ready.partition_point(|&r| r < child);
                ready.insert(pos, child);
            }
        }
    }
    order
}

/// Assemble nodes and edges: within a goal, actions chain sequentially;
/// across goals, a child's first action waits on the parent's last.
fn build_graph(meta: &MetaGoal, planned: &BTreeMap<usize, Vec<PlannedAction>>) -> PlanGraph {
    let mut nodes: Vec<PlannedAction> = Vec::new();
    let mut parents: HashMap<String, Vec<String>> = HashMap::new();
    let mut goal_map: BTreeMap<usize, Vec<String>> = BTreeMap::new();

    for (&index, actions) in planned {
        let ids: Vec<String> = actions.iter().map(|a| a.action_id.clone()).collect();
        for (i, action) in actions.iter().enumerate() {
            if i > 0 {
                parents
                    .entry(action.action_id.clone())
                    .or_default()
                    .push(actions[i - 1].action_id.clone());
            }
            nodes.push(action.clone());
        }
        for &parent_goal in meta.parents_of(index) {
            if let Some(parent_actions) = planned.get(&parent_goal)
                && let (Some(first), Some(last)) = (ids.first(), parent_actions.last())
            {
                parents
                    .entry(first.clone())
                    .or_default()
                    .push(last.action_id.clone());
            }
        }
        goal_map.insert(index, ids);
    }

    PlanGraph::new(nodes, parents, goal_map)
        .expect("goal DAG and sequential chains cannot form cycles")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Goal, MetaType, Params, Scope};
    use serde_json::json;

    fn world() -> WorldState {
        WorldState::bare("/home/user/work", "/home/user")
    }

    fn app_goal(id: &str, app: &str) -> Goal {
        let mut params = Params::new();
        params.insert("app".into(), json!(app));
        Goal::new("app", "launch", params, Some(app.into()), Scope::Root, id)
    }

    fn file_create(id: &str, target: &str, object_type: &str, scope: Scope) -> Goal {
        let mut params = Params::new();
        params.insert("object_type".into(), json!(object_type));
        params.insert("target".into(), json!(target));
        Goal::new("file", "create", params, Some(target.into()), scope, id)
    }

    #[test]
    fn independent_goals_share_no_edges() {
        let meta = MetaGoal::new(
            MetaType::IndependentMulti,
            vec![app_goal("g0", "chrome"), app_goal("g1", "spotify")],
            BTreeMap::new(),
        )
        .unwrap();
        let result = GoalOrchestrator::standard().assemble(&meta, &world());
        assert_eq!(result.status, OrchestrationStatus::Success);
        let graph = result.plan_graph.unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.execution_order(), ["g0_a1", "g1_a1"]);
    }

    #[test]
    fn containment_resolves_paths_and_orders_actions() {
        let meta = MetaGoal::new(
            MetaType::DependentMulti,
            vec![
                file_create(
                    "g0",
                    "alex",
                    "folder",
                    Scope::Anchor(crate::model::BaseAnchor::Drive('D')),
                ),
                file_create("g1", "presentation.pptx", "file", Scope::Inside("alex".into())),
            ],
            BTreeMap::from([(1, vec![0])]),
        )
        .unwrap();
        let result = GoalOrchestrator::standard().assemble(&meta, &world());
        assert_eq!(result.status, OrchestrationStatus::Success);
        let graph = result.plan_graph.unwrap();

        assert_eq!(graph.execution_order(), ["g0_a1", "g1_a1"]);
        assert_eq!(graph.parents_of("g1_a1"), ["g0_a1".to_string()]);

        let folder = graph.node("g0_a1").unwrap();
        assert_eq!(folder.description, "create:folder:D:\\alex");
        let file = graph.node("g1_a1").unwrap();
        assert_eq!(file.description, "create:file:D:\\alex\\presentation.pptx");
        assert_eq!(
            file.args.get("path"),
            Some(&json!("D:\\alex\\presentation.pptx"))
        );
    }

    #[test]
    fn unplannable_goal_blocks_everything_when_alone() {
        let meta = MetaGoal::single(Goal::new(
            "system",
            "schedule_task",
            Params::new(),
            None,
            Scope::Root,
            "g0",
        ));
        let result = GoalOrchestrator::standard().assemble(&meta, &world());
        assert_eq!(result.status, OrchestrationStatus::Blocked);
        assert!(result.plan_graph.is_none());
        assert_eq!(result.failed_goals.len(), 1);
        assert!(matches!(
            result.failed_goals[0].error,
            PipelineError::NoCapability { .. }
        ));
    }

    #[test]
    fn failure_propagates_to_descendants() {
        // g0 unplannable, g1 depends on it, g2 independent.
        let meta = MetaGoal::new(
            MetaType::DependentMulti,
            vec![
                Goal::new("system", "schedule_task", Params::new(), None, Scope::Root, "g0"),
                file_create("g1", "x", "folder", Scope::Inside("it".into())),
                app_goal("g2", "spotify"),
            ],
            BTreeMap::from([(1, vec![0])]),
        )
        .unwrap();
        let result = GoalOrchestrator::standard().assemble(&meta, &world());
        assert_eq!(result.status, OrchestrationStatus::Partial);
        assert_eq!(result.failed_goals.len(), 2);
        let graph = result.plan_graph.unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.node("g2_a1").is_some());
    }

    #[test]
    fn frames_flow_between_goals() {
        // g0 launches chrome (produces an app frame); g1 focuses "it"
        // with no explicit app param.
        let meta = MetaGoal::new(
            MetaType::DependentMulti,
            vec![
                app_goal("g0", "chrome"),
                Goal::new(
                    "app",
                    "focus",
                    Params::new(),
                    None,
                    Scope::AfterVerb("launch".into()),
                    "g1",
                ),
            ],
            BTreeMap::from([(1, vec![0])]),
        )
        .unwrap();
        let result = GoalOrchestrator::standard().assemble(&meta, &world());
        assert_eq!(result.status, OrchestrationStatus::Success);
        let graph = result.plan_graph.unwrap();
        assert_eq!(graph.node("g1_a1").unwrap().description, "focus:chrome");
    }

    #[test]
    fn meta_goal_is_not_mutated() {
        let meta = MetaGoal::new(
            MetaType::Single,
            vec![file_create("g0", "alex", "folder", Scope::Root)],
            BTreeMap::new(),
        )
        .unwrap();
        let _ = GoalOrchestrator::standard().assemble(&meta, &world());
        assert!(meta.goals[0].resolved_path.is_none());
    }
}
