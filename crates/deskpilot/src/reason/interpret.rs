//! Goal interpretation: utterance → `MetaGoal`.
//!
//! The provider emits an ordered list of parametric goals with scope
//! strings; everything structural (dependency edges, the meta type, the
//! container stack for anaphoric "inside it") is derived locally and
//! deterministically. The LLM proposes goals; it never defines structure.

use crate::error::PipelineError;
use crate::model::{Goal, MetaGoal, MetaType, Params, Scope, Utterance, WorldState};
use crate::provider::{GenerateRequest, OutputShape, Provider, generate_checked};
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Wire shape of one goal in the provider reply.
#[derive(Debug, Deserialize, JsonSchema)]
struct GoalSpec {
    /// Goal domain, e.g. "file", "app", "browser", "system".
    domain: String,
    /// Verb within the domain, e.g. "create", "launch", "navigate".
    verb: String,
    /// Technical parameters for the verb.
    #[serde(default)]
    params: Params,
    /// The user-visible object of the goal, e.g. "alex".
    #[serde(default)]
    object: Option<String>,
    /// Scope string: "root", "after:<verb>", "after:<gN>",
    /// "inside:<target>", "drive:<letter>", "desktop", "documents",
    /// "downloads", or "workspace".
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GoalListReply {
    goals: Vec<GoalSpec>,
}

const SYSTEM_PROMPT: &str = "\
You decompose a desktop-assistant request into an ordered list of goals.\n\
Each goal has: domain (app | browser | file | system | input), verb, \
params (technical parameters), object (the user's name for the thing), \
and scope.\n\n\
Scope rules:\n\
- \"root\" for an independent goal.\n\
- \"after:<verb>\" when the goal must follow an earlier goal with that verb.\n\
- \"inside:<target>\" when the goal's object lives inside an earlier \
goal's object. Use \"inside:it\" for anaphoric references.\n\
- \"drive:<letter>\" / \"desktop\" / \"documents\" / \"downloads\" / \
\"workspace\" when the user names a location.\n\n\
Example: \"create folder alex on D drive and create report.docx inside it\"\n\
-> goals: [\n\
  {\"domain\": \"file\", \"verb\": \"create\", \"params\": {\"object_type\": \
\"folder\", \"target\": \"alex\"}, \"object\": \"alex\", \"scope\": \"drive:d\"},\n\
  {\"domain\": \"file\", \"verb\": \"create\", \"params\": {\"object_type\": \
\"file\", \"target\": \"report.docx\"}, \"object\": \"report.docx\", \
\"scope\": \"inside:it\"}\n\
]\n\n\
Never invent absolute paths. Reply as JSON: {\"goals\": [...]}.";

const SINGLE_PROMPT: &str = "\
You extract exactly ONE goal from a desktop-assistant request.\n\
The goal has: domain (app | browser | file | system | input), verb, \
params, object, and scope (\"root\" unless the user names a location).\n\
For browser requests, put the final URL in params.url, folding a search \
into the site's results URL.\n\
Reply as JSON: {\"goals\": [<one goal>]}.";

/// Transforms a multi-routed utterance into a `MetaGoal` DAG.
pub struct GoalInterpreter<'a> {
    provider: &'a dyn Provider,
}

impl<'a> GoalInterpreter<'a> {
    pub fn new(provider: &'a dyn Provider) -> Self {
        Self { provider }
    }

    /// Interpret a multi-goal utterance. Structural failure returns a
    /// `Single` fallback carrying a synthetic unknown-domain goal and the
    /// legacy-decomposition flag rather than an error.
    pub async fn interpret(&self, utterance: &Utterance, _world: &WorldState) -> MetaGoal {
        match self.request_goals(SYSTEM_PROMPT, utterance).await {
            Ok(specs) if !specs.is_empty() => assemble(specs),
            Ok(_) => {
                warn!("interpreter returned zero goals; using legacy fallback");
                fallback_meta(utterance)
            }
            Err(e) => {
                warn!("interpretation failed ({e}); using legacy fallback");
                fallback_meta(utterance)
            }
        }
    }

    /// Extract one goal for the single-routed path.
    pub async fn extract_single(
        &self,
        utterance: &Utterance,
        _world: &WorldState,
    ) -> Result<Goal, PipelineError> {
        let mut specs = self.request_goals(SINGLE_PROMPT, utterance).await?;
        if specs.is_empty() {
            return Err(PipelineError::AmbiguousUtterance(
                "no goal extracted".into(),
            ));
        }
        let spec = specs.remove(0);
        Ok(goal_from_spec(spec, 0))
    }

    async fn request_goals(
        &self,
        system: &str,
        utterance: &Utterance,
    ) -> Result<Vec<GoalSpec>, PipelineError> {
        let request = GenerateRequest::new(
            system,
            &utterance.text,
            OutputShape::Json(crate::json_schema_for::<GoalListReply>()),
        );
        let value = generate_checked(self.provider, &request).await?;
        let reply: GoalListReply = serde_json::from_value(value)
            .map_err(|e| PipelineError::SchemaInvalid(format!("goal list: {e}")))?;
        Ok(reply.goals)
    }
}

fn goal_from_spec(spec: GoalSpec, index: usize) -> Goal {
    let scope = spec
        .scope
        .as_deref()
        .map(Scope::parse)
        .unwrap_or(Scope::Root);
    Goal::new(
        spec.domain,
        spec.verb,
        spec.params,
        spec.object,
        scope,
        format!("g{index}"),
    )
}

/// Build the `MetaGoal` from ordered specs: assign ids, derive the
/// dependency DAG, and determine the meta type.
fn assemble(specs: Vec<GoalSpec>) -> MetaGoal {
    let goals: Vec<Goal> = specs
        .into_iter()
        .enumerate()
        .map(|(i, spec)| goal_from_spec(spec, i))
        .collect();

    let dependencies = derive_dependencies(&goals);

    let meta_type = if goals.len() == 1 && dependencies.is_empty() {
        MetaType::Single
    } else if dependencies.is_empty() {
        MetaType::IndependentMulti
    } else {
        MetaType::DependentMulti
    };

    // Derivation only produces backward, non-self edges, so construction
    // cannot fail; the expect documents that contract.
    MetaGoal::new(meta_type, goals, dependencies)
        .expect("derived dependencies form a valid DAG")
}

/// Anaphors that bind to the container stack instead of a named object.
fn is_anaphor(target: &str) -> bool {
    matches!(target, "it" | "that" | "this")
}

/// Whether a goal opens a container later goals can live inside.
fn is_container(goal: &Goal) -> bool {
    goal.is_file_domain()
        && (crate::model::param_str(&goal.params, "object_type").as_deref() == Some("folder")
            || goal.verb == "open")
}

/// Derive the dependency map from scopes. Local and deterministic; bad
/// references are dropped with a log line, never fabricated into cycles.
fn derive_dependencies(goals: &[Goal]) -> BTreeMap<usize, Vec<usize>> {
    let mut dependencies: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    // Most-recently-opened containers, by goal index.
    let mut container_stack: Vec<usize> = Vec::new();

    for (i, goal) in goals.iter().enumerate() {
        let parent = match &goal.scope {
            Scope::Root | Scope::Anchor(_) => None,
            Scope::AfterVerb(verb) => {
                let found = goals[..i].iter().position(|g| &g.verb == verb);
                if found.is_none() {
                    warn!("goal {} references verb '{verb}' with no earlier match", goal.goal_id);
                }
                found
            }
            Scope::AfterGoal(gid) => {
                let found = goals[..i].iter().position(|g| &g.goal_id == gid);
                if found.is_none() {
                    warn!(
                        "goal {} references '{gid}', which is not an earlier goal",
                        goal.goal_id
                    );
                }
                found
            }
            Scope::Inside(target) => {
                let found = if is_anaphor(target) {
                    container_stack.last().copied()
                } else {
                    goals[..i].iter().position(|g| {
                        g.is_file_domain()
                            && g.identity().as_deref() == Some(target.as_str())
                    })
                };
                if found.is_none() {
                    warn!(
                        "goal {} has no earlier container for 'inside:{target}'",
                        goal.goal_id
                    );
                }
                found
            }
        };

        if let Some(p) = parent {
            debug!("goal {} depends on goal g{p}", goal.goal_id);
            dependencies.insert(i, vec![p]);
        }
        if is_container(goal) {
            container_stack.push(i);
        }
    }
    dependencies
}

/// The structural-failure fallback: one synthetic unknown-domain goal,
/// flagged for the legacy decomposition path.
fn fallback_meta(utterance: &Utterance) -> MetaGoal {
    let mut params = Params::new();
    params.insert(
        "utterance".into(),
        serde_json::Value::String(utterance.text.clone()),
    );
    let goal = Goal::new("unknown", "decompose", params, None, Scope::Root, "g0");
    let mut meta = MetaGoal::single(goal);
    meta.fallback = true;
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ScriptedProvider;
    use serde_json::json;

    fn utterance(text: &str) -> Utterance {
        Utterance::new(text, None, WorldState::bare("/w", "/h"))
    }

    fn world() -> WorldState {
        WorldState::bare("/w", "/h")
    }

    fn file_goal_spec(object: &str, object_type: &str, scope: &str) -> serde_json::Value {
        json!({
            "domain": "file",
            "verb": "create",
            "params": { "object_type": object_type, "target": object },
            "object": object,
            "scope": scope
        })
    }

    #[tokio::test]
    async fn independent_launches() {
        let provider = ScriptedProvider::new().reply(json!({
            "goals": [
                {"domain": "app", "verb": "launch", "params": {"app": "chrome"}, "object": "chrome", "scope": "root"},
                {"domain": "app", "verb": "launch", "params": {"app": "spotify"}, "object": "spotify", "scope": "root"}
            ]
        }));
        let interpreter = GoalInterpreter::new(&provider);
        let meta = interpreter
            .interpret(&utterance("open chrome and open spotify"), &world())
            .await;
        assert_eq!(meta.meta_type, MetaType::IndependentMulti);
        assert_eq!(meta.goals.len(), 2);
        assert!(meta.dependencies.is_empty());
        assert_eq!(meta.goals[0].goal_id, "g0");
        assert_eq!(meta.goals[1].goal_id, "g1");
    }

    #[tokio::test]
    async fn containment_creates_dependency() {
        let provider = ScriptedProvider::new().reply(json!({
            "goals": [
                file_goal_spec("alex", "folder", "drive:d"),
                file_goal_spec("presentation.pptx", "file", "inside:alex"),
            ]
        }));
        let interpreter = GoalInterpreter::new(&provider);
        let meta = interpreter
            .interpret(
                &utterance("create folder alex on D drive and create presentation.pptx inside it"),
                &world(),
            )
            .await;
        assert_eq!(meta.meta_type, MetaType::DependentMulti);
        assert_eq!(meta.dependencies, BTreeMap::from([(1, vec![0])]));
        assert_eq!(
            meta.goals[0].scope,
            Scope::Anchor(crate::model::BaseAnchor::Drive('D'))
        );
    }

    #[tokio::test]
    async fn anaphor_binds_to_most_recent_container() {
        let provider = ScriptedProvider::new().reply(json!({
            "goals": [
                file_goal_spec("outer", "folder", "root"),
                file_goal_spec("inner", "folder", "inside:outer"),
                file_goal_spec("notes.txt", "file", "inside:it"),
            ]
        }));
        let interpreter = GoalInterpreter::new(&provider);
        let meta = interpreter.interpret(&utterance("nested folders"), &world()).await;
        // "it" is the most recent container: inner (index 1), not outer.
        assert_eq!(meta.parents_of(2), &[1]);
        assert_eq!(meta.parents_of(1), &[0]);
    }

    #[tokio::test]
    async fn after_verb_binds_first_match() {
        let provider = ScriptedProvider::new().reply(json!({
            "goals": [
                {"domain": "app", "verb": "launch", "params": {"app": "chrome"}, "scope": "root"},
                {"domain": "browser", "verb": "navigate", "params": {"url": "https://a.b"}, "scope": "after:launch"},
            ]
        }));
        let interpreter = GoalInterpreter::new(&provider);
        let meta = interpreter.interpret(&utterance("open chrome then go to a.b"), &world()).await;
        assert_eq!(meta.parents_of(1), &[0]);
        assert_eq!(meta.meta_type, MetaType::DependentMulti);
    }

    #[tokio::test]
    async fn unmatched_references_are_dropped() {
        let provider = ScriptedProvider::new().reply(json!({
            "goals": [
                {"domain": "browser", "verb": "navigate", "params": {"url": "https://a.b"}, "scope": "after:launch"},
                {"domain": "app", "verb": "launch", "params": {"app": "chrome"}, "scope": "root"},
            ]
        }));
        let interpreter = GoalInterpreter::new(&provider);
        let meta = interpreter.interpret(&utterance("backwards"), &world()).await;
        // The forward reference is dropped, not fabricated into a cycle.
        assert!(meta.dependencies.is_empty());
        assert_eq!(meta.meta_type, MetaType::IndependentMulti);
    }

    #[tokio::test]
    async fn schema_failure_yields_flagged_fallback() {
        let provider = ScriptedProvider::new()
            .reply(json!("nonsense"))
            .reply(json!({"wrong": true}));
        let interpreter = GoalInterpreter::new(&provider);
        let meta = interpreter.interpret(&utterance("???"), &world()).await;
        assert!(meta.fallback);
        assert_eq!(meta.meta_type, MetaType::Single);
        assert_eq!(meta.goals[0].domain, "unknown");
    }

    #[tokio::test]
    async fn extract_single_returns_one_goal() {
        let provider = ScriptedProvider::new().reply(json!({
            "goals": [{
                "domain": "browser",
                "verb": "navigate",
                "params": {"url": "https://www.youtube.com/results?search_query=nvidia"},
                "object": "youtube",
                "scope": "root"
            }]
        }));
        let interpreter = GoalInterpreter::new(&provider);
        let goal = interpreter
            .extract_single(&utterance("open youtube and search nvidia"), &world())
            .await
            .unwrap();
        assert_eq!(goal.domain, "browser");
        assert_eq!(goal.goal_id, "g0");
    }

    #[tokio::test]
    async fn single_goal_without_deps_is_single_meta() {
        let provider = ScriptedProvider::new().reply(json!({
            "goals": [file_goal_spec("alex", "folder", "desktop")]
        }));
        let interpreter = GoalInterpreter::new(&provider);
        let meta = interpreter.interpret(&utterance("folder on desktop"), &world()).await;
        assert_eq!(meta.meta_type, MetaType::Single);
        assert!(!meta.fallback);
    }
}
