//! Planned actions, per-goal plans, the assembled plan graph, and the
//! context frames planners hand to each other.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Parameter map carried by goals, actions, and context frames.
///
/// `serde_json::Map` keeps keys ordered, which keeps descriptions and
/// logs deterministic.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Read a string-or-scalar param as a string.
pub fn param_str(params: &Params, key: &str) -> Option<String> {
    match params.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Whether an action changes the world or only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionClass {
    Actuate,
    Observe,
}

/// One validated, parameter-authoritative step.
///
/// `args` is the final parameter set for the eventual tool call: downstream
/// resolution must not add, rewrite, or drop keys. `description` is the
/// short structured string (`navigate:https://…`, `create:folder:D:\alex`)
/// the resolver's lookup and similarity stages run on.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    pub action_id: String,
    pub intent: crate::model::Intent,
    pub description: String,
    pub args: Params,
    pub action_class: ActionClass,
    /// A context-only action: it produced a `ContextFrame` during planning
    /// and maps to no tool. The resolver skips it; the executor marks it
    /// satisfied without an invocation.
    pub semantic_only: bool,
}

/// A planner's output for one goal.
#[derive(Debug, Clone)]
pub struct Plan {
    pub actions: Vec<PlannedAction>,
    pub goal_achieved_by: String,
    pub total_actions: usize,
}

impl Plan {
    /// Build a plan, checking the count and achieved-by invariants.
    pub fn new(actions: Vec<PlannedAction>, goal_achieved_by: String) -> Result<Self, String> {
        if !actions.iter().any(|a| a.action_id == goal_achieved_by) {
            return Err(format!(
                "goal_achieved_by '{goal_achieved_by}' is not an action in the plan"
            ));
        }
        let total_actions = actions.len();
        Ok(Self {
            actions,
            goal_achieved_by,
            total_actions,
        })
    }
}

/// Small typed data handed from one planner to a later one, under the
/// rules table's declared production/consumption pairs. Read-only after
/// planning.
#[derive(Debug, Clone)]
pub struct ContextFrame {
    /// The action or goal id that produced this frame.
    pub produced_by: String,
    pub domain: String,
    pub data: Params,
}

/// The assembled DAG of all planned actions across a meta-goal.
///
/// Nodes are keyed by action id (`g0_a1`); edges point from a node to its
/// parents. `execution_order` is a stable topological sort with ties broken
/// by goal index, then by action index within the goal, which is exactly
/// node insertion order.
#[derive(Debug, Clone)]
pub struct PlanGraph {
    nodes: Vec<PlannedAction>,
    index: HashMap<String, usize>,
    parents: HashMap<String, Vec<String>>,
    execution_order: Vec<String>,
    goal_map: BTreeMap<usize, Vec<String>>,
}

impl PlanGraph {
    /// Build and validate a plan graph. `nodes` must already be in
    /// (goal index, action index) order; `parents` maps an action id to
    /// the ids it waits on. Fails on unknown edge endpoints, duplicate
    /// ids, or cycles.
    pub fn new(
        nodes: Vec<PlannedAction>,
        parents: HashMap<String, Vec<String>>,
        goal_map: BTreeMap<usize, Vec<String>>,
    ) -> Result<Self, String> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.action_id.clone(), i).is_some() {
                return Err(format!("duplicate action id '{}'", node.action_id));
            }
        }
        for (child, ps) in &parents {
            if !index.contains_key(child) {
                return Err(format!("edge child '{child}' is not a node"));
            }
            for parent in ps {
                if !index.contains_key(parent) {
                    return Err(format!("edge parent '{parent}' is not a node"));
                }
            }
        }

        let execution_order = stable_topo_sort(&nodes, &index, &parents)?;

        Ok(Self {
            nodes,
            index,
            parents,
            execution_order,
            goal_map,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, action_id: &str) -> Option<&PlannedAction> {
        self.index.get(action_id).map(|&i| &self.nodes[i])
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[PlannedAction] {
        &self.nodes
    }

    /// The parents an action waits on (empty if independent).
    pub fn parents_of(&self, action_id: &str) -> &[String] {
        self.parents
            .get(action_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Total number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.parents.values().map(|v| v.len()).sum()
    }

    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// The action ids planned for a goal index.
    pub fn actions_for_goal(&self, goal_index: usize) -> &[String] {
        self.goal_map
            .get(&goal_index)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Group the execution order into waves: actions in a wave have all
    /// parents in earlier waves and may run concurrently.
    pub fn waves(&self) -> Vec<Vec<String>> {
        let mut depth: HashMap<&str, usize> = HashMap::with_capacity(self.nodes.len());
        let mut waves: Vec<Vec<String>> = Vec::new();
        for id in &self.execution_order {
            let d = self
                .parents_of(id)
                .iter()
                .map(|p| depth.get(p.as_str()).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id.as_str(), d);
            if waves.len() <= d {
                waves.resize_with(d + 1, Vec::new);
            }
            waves[d].push(id.clone());
        }
        waves
    }
}

/// Kahn's algorithm with a deterministic tie-break: among ready nodes,
/// the one with the lowest insertion index goes first.
fn stable_topo_sort(
    nodes: &[PlannedAction],
    index: &HashMap<String, usize>,
    parents: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, String> {
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (child, ps) in parents {
        let child_idx = index[child.as_str()];
        in_degree[child_idx] = ps.len();
        for parent in ps {
            dependents[index[parent.as_str()]].push(child_idx);
        }
    }

    // Ready set kept sorted by insertion index; pulling the minimum keeps
    // the order stable across runs.
    let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(i) = ready.pop_front() {
        order.push(nodes[i].action_id.clone());
        let mut released: Vec<usize> = Vec::new();
        for &dep in &dependents[i] {
            in_degree[dep] -= 1;
            if in_degree[dep] == 0 {
                released.push(dep);
            }
        }
        for dep in released {
            let pos = ready.partition_point(|&r| r < dep);
            ready.insert(pos, dep);
        }
    }

    if order.len() < nodes.len() {
        return Err(format!(
            "cycle detected: {} of {} actions could not be ordered",
            nodes.len() - order.len(),
            nodes.len()
        ));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Intent;

    fn action(id: &str) -> PlannedAction {
        PlannedAction {
            action_id: id.into(),
            intent: Intent::FileOperation,
            description: format!("noop:{id}"),
            args: Params::new(),
            action_class: ActionClass::Actuate,
            semantic_only: false,
        }
    }

    fn graph(
        ids: &[&str],
        edges: &[(&str, &str)],
    ) -> Result<PlanGraph, String> {
        let nodes = ids.iter().map(|id| action(id)).collect();
        let mut parents: HashMap<String, Vec<String>> = HashMap::new();
        for (child, parent) in edges {
            parents
                .entry((*child).to_string())
                .or_default()
                .push((*parent).to_string());
        }
        PlanGraph::new(nodes, parents, BTreeMap::new())
    }

    #[test]
    fn plan_enforces_achieved_by() {
        let err = Plan::new(vec![action("g0_a1")], "g9_a9".into());
        assert!(err.is_err());
        let ok = Plan::new(vec![action("g0_a1")], "g0_a1".into()).unwrap();
        assert_eq!(ok.total_actions, 1);
    }

    #[test]
    fn topo_order_respects_edges() {
        let g = graph(
            &["g0_a1", "g1_a1", "g2_a1"],
            &[("g1_a1", "g0_a1"), ("g2_a1", "g1_a1")],
        )
        .unwrap();
        assert_eq!(g.execution_order(), ["g0_a1", "g1_a1", "g2_a1"]);
    }

    #[test]
    fn ties_broken_by_insertion_order() {
        // Diamond: b and c are both ready after a; b was inserted first.
        let g = graph(
            &["a", "b", "c", "d"],
            &[("b", "a"), ("c", "a"), ("d", "b"), ("d", "c")],
        )
        .unwrap();
        assert_eq!(g.execution_order(), ["a", "b", "c", "d"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let err = graph(&["a", "b"], &[("a", "b"), ("b", "a")]);
        assert!(err.unwrap_err().contains("cycle"));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let err = graph(&["a"], &[("a", "ghost")]);
        assert!(err.unwrap_err().contains("not a node"));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = graph(&["a", "a"], &[]);
        assert!(err.unwrap_err().contains("duplicate"));
    }

    #[test]
    fn waves_group_independent_actions() {
        let g = graph(
            &["a", "b", "c", "d"],
            &[("c", "a"), ("c", "b"), ("d", "c")],
        )
        .unwrap();
        let waves = g.waves();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], ["a", "b"]);
        assert_eq!(waves[1], ["c"]);
        assert_eq!(waves[2], ["d"]);
    }

    #[test]
    fn independent_graph_is_one_wave() {
        let g = graph(&["a", "b"], &[]).unwrap();
        assert_eq!(g.waves(), vec![vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn param_str_coerces_scalars() {
        let mut params = Params::new();
        params.insert("x".into(), serde_json::json!(500));
        params.insert("url".into(), serde_json::json!("https://a.b"));
        params.insert("flag".into(), serde_json::json!(true));
        params.insert("list".into(), serde_json::json!([1]));
        assert_eq!(param_str(&params, "x").as_deref(), Some("500"));
        assert_eq!(param_str(&params, "url").as_deref(), Some("https://a.b"));
        assert_eq!(param_str(&params, "flag").as_deref(), Some("true"));
        assert_eq!(param_str(&params, "list"), None);
    }
}
