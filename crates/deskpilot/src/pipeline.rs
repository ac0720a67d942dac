//! The top-level request pipeline.
//!
//! `process()` wires the stages together: snapshot the world, route the
//! utterance, then either answer directly, ask for clarification, or
//! interpret → orchestrate → resolve → execute. Every failure folds into
//! the returned [`RunResult`]; nothing escapes as an error. The response
//! formatter at the bottom of this file is the only producer of
//! user-facing prose.

use crate::error::PipelineError;
use crate::exec::{ActionOutcome, ExecutionReport, ExecutorOptions, FinalStatus, PlanExecutor};
use crate::model::{
    Classification, Intent, IntentDecision, MetaGoal, PlanGraph, Utterance, WorldState,
    WorldStateProvider,
};
use crate::plan::{GoalOrchestrator, OrchestrationResult, OrchestrationStatus};
use crate::provider::{GenerateRequest, OutputShape, Provider};
use crate::reason::{GoalInterpreter, IntentClassifier, QueryClassifier};
use crate::tools::ToolRegistry;
use crate::tools::resolve::ToolResolver;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pipeline-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub executor: ExecutorOptions,
}

/// Machine-readable result of one request.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub final_status: FinalStatus,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    /// Per-action outcomes, execution order.
    pub outcomes: Vec<ActionOutcome>,
    /// Direct answer for query-style requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Clarifying question when the pipeline stopped to ask.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Human-readable summary, produced by [`render_summary`].
    pub summary: String,
}

impl RunResult {
    fn shell(classification: Classification, final_status: FinalStatus) -> Self {
        Self {
            final_status,
            classification,
            intent: None,
            outcomes: Vec::new(),
            answer: None,
            clarification: None,
            session_id: None,
            summary: String::new(),
        }
    }

    fn summarized(mut self) -> Self {
        self.summary = render_summary(&self);
        self
    }
}

/// The assembled core: provider + registry + world source + stages.
pub struct Pipeline {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    world_source: Box<dyn WorldStateProvider>,
    orchestrator: GoalOrchestrator,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        world_source: Box<dyn WorldStateProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            world_source,
            orchestrator: GoalOrchestrator::standard(),
            config,
        }
    }

    /// Process one utterance end to end.
    pub async fn process(&self, text: &str, session_id: Option<String>) -> RunResult {
        let world = self.world_source.snapshot();
        let utterance = Utterance::new(text, session_id, world.clone());
        info!("processing: {text}");

        let classification = QueryClassifier::new(self.provider.as_ref())
            .classify(&utterance)
            .await;
        debug!("routed as {classification}");

        match classification {
            Classification::Single => self.process_single(&utterance, &world).await,
            Classification::Multi => self.process_multi(&utterance, &world).await,
        }
    }

    async fn process_single(&self, utterance: &Utterance, world: &WorldState) -> RunResult {
        let report = IntentClassifier::new(self.provider.as_ref())
            .classify(utterance, world)
            .await;

        // An ask decision terminates the pipeline here: no goal
        // extraction, no resolution, no tools.
        if report.decision == IntentDecision::Ask {
            let mut result = RunResult::shell(Classification::Single, FinalStatus::Blocked);
            result.intent = Some(report.intent);
            result.clarification = report
                .question
                .or_else(|| Some("Could you clarify what you want me to do?".into()));
            return result.summarized();
        }

        // Query-style intents bypass tools entirely, as does the unknown
        // fallback: both are answered directly by the provider.
        if report.intent.is_answer_only() || report.intent == Intent::Unknown {
            let answer = self.direct_answer(&utterance.text).await;
            let mut result = RunResult::shell(
                Classification::Single,
                if answer.is_some() {
                    FinalStatus::Success
                } else {
                    FinalStatus::Failed
                },
            );
            result.intent = Some(report.intent);
            result.answer = answer;
            return result.summarized();
        }

        let interpreter = GoalInterpreter::new(self.provider.as_ref());
        let goal = match interpreter.extract_single(utterance, world).await {
            Ok(goal) => goal,
            Err(e) => {
                warn!("single-goal extraction failed: {e}");
                let mut result = RunResult::shell(Classification::Single, FinalStatus::Failed);
                result.intent = Some(report.intent);
                return result.summarized();
            }
        };

        let meta = MetaGoal::single(goal);
        let mut result = self.orchestrate_and_execute(&meta, world).await;
        result.classification = Classification::Single;
        result.intent = Some(report.intent);
        result.summarized()
    }

    async fn process_multi(&self, utterance: &Utterance, world: &WorldState) -> RunResult {
        let interpreter = GoalInterpreter::new(self.provider.as_ref());
        let meta = interpreter.interpret(utterance, world).await;

        // The legacy-decomposition fallback answers directly rather than
        // planning a synthetic unknown-domain goal.
        if meta.fallback {
            let answer = self.direct_answer(&utterance.text).await;
            let mut result = RunResult::shell(
                Classification::Multi,
                if answer.is_some() {
                    FinalStatus::Partial
                } else {
                    FinalStatus::Failed
                },
            );
            result.answer = answer;
            return result.summarized();
        }

        let result = self.orchestrate_and_execute(&meta, world).await;
        result.summarized()
    }

    async fn orchestrate_and_execute(&self, meta: &MetaGoal, world: &WorldState) -> RunResult {
        let orchestration = self.orchestrator.assemble(meta, world);
        for failed in &orchestration.failed_goals {
            warn!("goal {} failed planning: {}", failed.goal_id, failed.error);
        }

        let OrchestrationResult {
            status,
            plan_graph,
            failed_goals,
            ..
        } = orchestration;

        let Some(graph) = plan_graph else {
            let mut result = RunResult::shell(Classification::Multi, FinalStatus::Blocked);
            result.outcomes = failed_goals
                .iter()
                .map(|f| planning_failure_outcome(&f.goal_id, &f.error))
                .collect();
            return result;
        };

        // Resolve every non-context action up front. A resolution miss
        // fails the plan: there is no cross-domain fallback.
        let resolution = match self.resolve_all(&graph) {
            Ok(map) => map,
            Err(e) => {
                warn!("resolution failed: {e}");
                let mut result = RunResult::shell(Classification::Multi, FinalStatus::Failed);
                result.outcomes = vec![ActionOutcome {
                    action_id: "resolution".into(),
                    tool: None,
                    status: crate::exec::ActionStatus::Failed,
                    message: e.to_string(),
                    error: Some(e.kind().into()),
                }];
                return result;
            }
        };

        let executor = PlanExecutor::new(self.registry.clone(), self.config.executor.clone());
        let ExecutionReport {
            final_status,
            mut outcomes,
            session_id,
        } = executor.run(&graph, &resolution, world).await;

        // Goals that never made it into the graph still show up in the
        // outcome list, so partial planning is visible in the result.
        outcomes.extend(
            failed_goals
                .iter()
                .map(|f| planning_failure_outcome(&f.goal_id, &f.error)),
        );

        let final_status = match (status, final_status) {
            (OrchestrationStatus::Success, s) => s,
            (OrchestrationStatus::Partial, FinalStatus::Success) => FinalStatus::Partial,
            (OrchestrationStatus::Partial, s) => s,
            (OrchestrationStatus::Blocked, _) => FinalStatus::Blocked,
        };

        let mut result = RunResult::shell(Classification::Multi, final_status);
        result.outcomes = outcomes;
        result.session_id = session_id;
        result
    }

    fn resolve_all(&self, graph: &PlanGraph) -> Result<HashMap<String, String>, PipelineError> {
        let resolver = ToolResolver::new(self.registry.clone());
        let mut resolution = HashMap::new();
        for action in graph.nodes() {
            if action.semantic_only {
                continue;
            }
            let tool = resolver.resolve(action)?;
            resolution.insert(action.action_id.clone(), tool);
        }
        Ok(resolution)
    }

    async fn direct_answer(&self, text: &str) -> Option<String> {
        let request = GenerateRequest::new(
            "You are a concise desktop assistant. Answer the user's question directly.",
            text,
            OutputShape::Text,
        );
        match self.provider.generate(&request).await {
            Ok(value) => value.as_str().map(str::to_string),
            Err(e) => {
                warn!("direct answer failed: {e}");
                None
            }
        }
    }
}

fn planning_failure_outcome(goal_id: &str, error: &PipelineError) -> ActionOutcome {
    ActionOutcome {
        action_id: goal_id.to_string(),
        tool: None,
        status: crate::exec::ActionStatus::Failed,
        message: error.to_string(),
        error: Some(error.kind().into()),
    }
}

// ── Response formatting ────────────────────────────────────────────

/// Render the one user-facing summary line for a result.
pub fn render_summary(result: &RunResult) -> String {
    if let Some(question) = &result.clarification {
        return question.clone();
    }
    if let Some(answer) = &result.answer {
        return answer.clone();
    }
    let done = result
        .outcomes
        .iter()
        .filter(|o| o.status == crate::exec::ActionStatus::Success)
        .count();
    let total = result.outcomes.len();
    match result.final_status {
        FinalStatus::Success => format!("Done: {done} action(s) completed."),
        FinalStatus::Partial => format!("Partially done: {done} of {total} action(s) completed."),
        FinalStatus::Failed => {
            let first = result
                .outcomes
                .iter()
                .find(|o| o.status != crate::exec::ActionStatus::Success)
                .map(|o| o.message.clone())
                .unwrap_or_else(|| "unknown failure".into());
            format!("Failed: {first}")
        }
        FinalStatus::Blocked => {
            let first = result
                .outcomes
                .first()
                .map(|o| o.message.clone())
                .unwrap_or_else(|| "nothing could be planned".into());
            format!("Blocked: {first}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorldState;
    use crate::provider::ScriptedProvider;
    use crate::tools::builtin::{ActionRecorder, standard_registry};
    use serde_json::json;
    use std::time::Duration;

    struct FixedWorld(WorldState);

    impl WorldStateProvider for FixedWorld {
        fn snapshot(&self) -> WorldState {
            self.0.clone()
        }
    }

    fn pipeline_with(
        provider: ScriptedProvider,
        recorder: &ActionRecorder,
        world: WorldState,
    ) -> Pipeline {
        let config = PipelineConfig {
            executor: ExecutorOptions {
                destructive_cooldown: Duration::ZERO,
                ..ExecutorOptions::default()
            },
        };
        Pipeline::new(
            Arc::new(provider),
            Arc::new(standard_registry(recorder)),
            Box::new(FixedWorld(world)),
            config,
        )
    }

    fn world() -> WorldState {
        WorldState::bare("/home/user/work", "/home/user")
    }

    // S1: one semantic action folded into a single navigate call.
    #[tokio::test]
    async fn s1_single_browser_action() {
        let provider = ScriptedProvider::new()
            // Query classifier fallback: single.
            .reply(json!("single"))
            // Intent classification.
            .reply(json!({
                "decision": "act",
                "intent": "browser_control",
                "confidence": 0.95
            }))
            // Single-goal extraction.
            .reply(json!({
                "goals": [{
                    "domain": "browser",
                    "verb": "navigate",
                    "params": {"url": "https://www.youtube.com/results?search_query=nvidia"},
                    "object": "youtube",
                    "scope": "root"
                }]
            }));
        let recorder = ActionRecorder::new();
        let pipeline = pipeline_with(provider, &recorder, world());

        let result = pipeline
            .process("open youtube and search nvidia", None)
            .await;

        assert_eq!(result.classification, Classification::Single);
        assert_eq!(result.intent, Some(Intent::BrowserControl));
        assert_eq!(result.final_status, FinalStatus::Success);
        let entries = recorder.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("browser.navigate"));
        assert!(entries[0].contains("url=https://www.youtube.com/results?search_query=nvidia"));
    }

    // S2: two independent launches, zero edges, both executed.
    #[tokio::test]
    async fn s2_independent_multi() {
        let provider = ScriptedProvider::new()
            // Deterministic phase catches the launch pair; first reply is
            // the interpreter's.
            .reply(json!({
                "goals": [
                    {"domain": "app", "verb": "launch", "params": {"app": "chrome"}, "object": "chrome", "scope": "root"},
                    {"domain": "app", "verb": "launch", "params": {"app": "spotify"}, "object": "spotify", "scope": "root"}
                ]
            }));
        let recorder = ActionRecorder::new();
        let pipeline = pipeline_with(provider, &recorder, world());

        let result = pipeline.process("open chrome and open spotify", None).await;

        assert_eq!(result.classification, Classification::Multi);
        assert_eq!(result.final_status, FinalStatus::Success);
        assert_eq!(recorder.entries().len(), 2);
    }

    // S3: containment dependency, resolved paths, folder before file.
    #[tokio::test]
    async fn s3_dependent_file_creation() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().display().to_string();
        let provider = ScriptedProvider::new().reply(json!({
            "goals": [
                {"domain": "file", "verb": "create",
                 "params": {"object_type": "folder", "target": "alex"},
                 "object": "alex", "scope": "workspace"},
                {"domain": "file", "verb": "create",
                 "params": {"object_type": "file", "target": "presentation.pptx"},
                 "object": "presentation.pptx", "scope": "inside:alex"}
            ]
        }));
        let recorder = ActionRecorder::new();
        let pipeline = pipeline_with(
            provider,
            &recorder,
            WorldState::bare(&workspace, "/home/user"),
        );

        let result = pipeline
            .process(
                "create folder alex and create presentation.pptx inside it",
                None,
            )
            .await;

        assert_eq!(result.final_status, FinalStatus::Success);
        assert!(dir.path().join("alex/presentation.pptx").exists());
    }

    // S4: no rule for the goal; nothing is invoked.
    #[tokio::test]
    async fn s4_no_capability_blocks() {
        let provider = ScriptedProvider::new()
            .reply(json!("multi"))
            .reply(json!({
                "goals": [{
                    "domain": "system", "verb": "schedule_task",
                    "params": {"when": "monday 9am"}, "scope": "root"
                }]
            }));
        let recorder = ActionRecorder::new();
        let pipeline = pipeline_with(provider, &recorder, world());

        let result = pipeline
            .process("schedule a recurring task every Monday at 9am", None)
            .await;

        assert_eq!(result.final_status, FinalStatus::Blocked);
        assert!(recorder.entries().is_empty());
        assert_eq!(result.outcomes[0].error.as_deref(), Some("no_capability"));
    }

    // S6: information query answered without any tool.
    #[tokio::test]
    async fn s6_information_query_bypasses_tools() {
        let provider = ScriptedProvider::new()
            .reply(json!("single"))
            .reply(json!({
                "decision": "act",
                "intent": "information_query",
                "confidence": 0.97
            }))
            .reply(json!("It's 14:05."));
        let recorder = ActionRecorder::new();
        let pipeline = pipeline_with(provider, &recorder, world());

        let result = pipeline.process("what time is it", None).await;

        assert_eq!(result.final_status, FinalStatus::Success);
        assert_eq!(result.answer.as_deref(), Some("It's 14:05."));
        assert!(recorder.entries().is_empty());
        assert!(result.outcomes.is_empty());
        assert_eq!(result.summary, "It's 14:05.");
    }

    #[tokio::test]
    async fn ask_decision_stops_before_tools() {
        let provider = ScriptedProvider::new()
            .reply(json!("single"))
            .reply(json!({
                "decision": "ask",
                "intent": "file_operation",
                "confidence": 0.3,
                "question": "Which folder?"
            }));
        let recorder = ActionRecorder::new();
        let pipeline = pipeline_with(provider, &recorder, world());

        let result = pipeline.process("delete the folder", None).await;

        assert_eq!(result.final_status, FinalStatus::Blocked);
        assert_eq!(result.clarification.as_deref(), Some("Which folder?"));
        assert_eq!(result.summary, "Which folder?");
        assert!(recorder.entries().is_empty());
        assert!(result.outcomes.is_empty());
    }

    // S5, permitted side: the same click resolves and fires under the
    // input_control intent. (The denied side lives with the resolver.)
    #[tokio::test]
    async fn s5_click_allowed_under_input_control() {
        let provider = ScriptedProvider::new()
            .reply(json!("single"))
            .reply(json!({
                "decision": "act",
                "intent": "input_control",
                "confidence": 0.9
            }))
            .reply(json!({
                "goals": [{
                    "domain": "input", "verb": "click",
                    "params": {"x": 500, "y": 300}, "scope": "root"
                }]
            }));
        let recorder = ActionRecorder::new();
        let pipeline = pipeline_with(provider, &recorder, world());

        let result = pipeline.process("click at 500, 300", None).await;

        assert_eq!(result.final_status, FinalStatus::Success);
        let entries = recorder.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("system.input.mouse.click"));
        assert!(entries[0].contains("x=500"));
    }

    #[tokio::test]
    async fn interpreter_fallback_answers_directly() {
        let provider = ScriptedProvider::new()
            .reply(json!("multi"))
            // Interpreter: two invalid replies exhaust the retry.
            .reply(json!("not goals"))
            .reply(json!({"nope": 1}))
            // Legacy fallback answer.
            .reply(json!("Here's what I can do instead."));
        let recorder = ActionRecorder::new();
        let pipeline = pipeline_with(provider, &recorder, world());

        let result = pipeline.process("do something odd", None).await;

        assert_eq!(result.final_status, FinalStatus::Partial);
        assert_eq!(
            result.answer.as_deref(),
            Some("Here's what I can do instead.")
        );
        assert!(recorder.entries().is_empty());
    }

    #[tokio::test]
    async fn summary_counts_partial_completion() {
        let mut result = RunResult::shell(Classification::Multi, FinalStatus::Partial);
        result.outcomes = vec![
            ActionOutcome {
                action_id: "g0_a1".into(),
                tool: Some("system.apps.launch".into()),
                status: crate::exec::ActionStatus::Success,
                message: "done".into(),
                error: None,
            },
            ActionOutcome {
                action_id: "g1_a1".into(),
                tool: None,
                status: crate::exec::ActionStatus::Failed,
                message: "boom".into(),
                error: Some("tool_failure".into()),
            },
        ];
        assert_eq!(
            render_summary(&result),
            "Partially done: 1 of 2 action(s) completed."
        );
    }
}
