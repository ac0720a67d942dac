//! Intent classification for single-routed utterances.
//!
//! One LLM call with a schema-validated reply: an act-or-ask decision, a
//! tag from the closed intent set, a confidence, and an optional
//! clarifying question. An `Ask` decision terminates the pipeline before
//! any tool resolution; that is enforced by the caller and tested here.

use crate::model::{Intent, IntentDecision, IntentReport, Utterance, WorldState};
use crate::provider::{GenerateRequest, OutputShape, Provider, generate_checked};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

/// Wire shape of the classifier reply.
#[derive(Debug, Deserialize, JsonSchema)]
struct IntentReply {
    /// "act" to proceed, "ask" to request clarification.
    decision: String,
    /// One of the known intent tags.
    intent: String,
    /// Confidence in [0, 1].
    confidence: f64,
    /// Clarifying question, required when decision is "ask".
    #[serde(default)]
    question: Option<String>,
}

fn system_prompt(world: &WorldState) -> String {
    let tags: Vec<&str> = Intent::ALL.iter().map(|i| i.tag()).collect();
    format!(
        "You classify desktop-assistant requests into exactly one intent tag.\n\
         Tags: {}.\n\n\
         Examples:\n\
         - \"open spotify\" -> application_launch\n\
         - \"open youtube and search nvidia\" -> browser_control\n\
         - \"create a folder called projects\" -> file_operation\n\
         - \"set the volume to 30\" -> system_control\n\
         - \"what time is it\" -> information_query\n\
         - \"click at 500, 300\" -> input_control\n\n\
         Decide \"act\" when the request is unambiguous; decide \"ask\" and \
         include a short question when acting would require guessing.\n\
         Currently running applications: {}.\n\
         Reply as JSON: {{\"decision\", \"intent\", \"confidence\", \"question\"}}.",
        tags.join(", "),
        if world.running_apps.is_empty() {
            "none".to_string()
        } else {
            world.running_apps.join(", ")
        }
    )
}

/// Classifies a `Single`-routed utterance into the closed intent set.
pub struct IntentClassifier<'a> {
    provider: &'a dyn Provider,
}

impl<'a> IntentClassifier<'a> {
    pub fn new(provider: &'a dyn Provider) -> Self {
        Self { provider }
    }

    /// Classify. Total: structural failures downgrade to the `unknown`
    /// report (confidence 0), which routes to the free-form answer path.
    pub async fn classify(&self, utterance: &Utterance, world: &WorldState) -> IntentReport {
        let request = GenerateRequest::new(
            system_prompt(world),
            &utterance.text,
            OutputShape::Json(crate::json_schema_for::<IntentReply>()),
        );

        let value = match generate_checked(self.provider, &request).await {
            Ok(v) => v,
            Err(e) => {
                warn!("intent classification failed ({e}); using unknown");
                return IntentReport::unknown();
            }
        };
        let reply: IntentReply = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!("intent reply not deserializable ({e}); using unknown");
                return IntentReport::unknown();
            }
        };

        let Some(intent) = Intent::from_tag(&reply.intent) else {
            warn!("intent tag '{}' not in the closed set; using unknown", reply.intent);
            return IntentReport::unknown();
        };
        let decision = match reply.decision.as_str() {
            "ask" => IntentDecision::Ask,
            _ => IntentDecision::Act,
        };
        debug!(
            "intent {} (confidence {:.2}, {:?})",
            intent, reply.confidence, decision
        );
        IntentReport::new(decision, intent, reply.confidence, reply.question)
    }
}
