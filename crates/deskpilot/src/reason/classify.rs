//! Single-vs-multi routing.
//!
//! Two phases: a deterministic marker scan that needs no model at all,
//! then an LLM fallback with a strict two-token output. The classifier is
//! stateless, never reads the world snapshot, and emits exactly one tag,
//! never verbs, actions, or substrings.

use crate::model::{Classification, Utterance};
use crate::provider::{GenerateRequest, OutputShape, Provider, generate_checked};
use tracing::{debug, warn};

/// Verbs that open or start something. Two of these joined by "and", each
/// with its own object, signal independent goals.
const LAUNCH_VERBS: &[&str] = &["open", "launch", "start", "run"];

/// Marker word pairs that signal a dependency between clauses.
const DEPENDENCY_BIGRAMS: &[(&str, &str)] = &[
    ("inside", "it"),
    ("inside", "that"),
    ("inside", "the"),
    ("into", "it"),
    ("into", "that"),
    ("into", "the"),
    ("to", "it"),
    ("to", "that"),
    ("to", "the"),
    ("after", "that"),
];

const SYSTEM_PROMPT: &str = "\
You route desktop-assistant requests. Decide whether the request expresses \
ONE atomic goal or MULTIPLE separate goals. A request with several verbs \
that describe properties of the same action (a destination, a search query) \
is still one goal. Two launch/open clauses, or any reference back to an \
earlier result (\"it\", \"that\"), means multiple goals.

Examples:
- \"open youtube and search nvidia\" -> single
- \"what time is it\" -> single
- \"open chrome and open spotify\" -> multi
- \"create folder alex and put a file inside it\" -> multi
- \"mute the volume then lock the screen\" -> multi

Reply with exactly one word: single or multi.";

/// Routes an utterance to the single- or multi-goal path.
pub struct QueryClassifier<'a> {
    provider: &'a dyn Provider,
}

impl<'a> QueryClassifier<'a> {
    pub fn new(provider: &'a dyn Provider) -> Self {
        Self { provider }
    }

    /// Classify an utterance. Total: provider failure degrades to `Multi`,
    /// which the richer pipeline handles either way.
    pub async fn classify(&self, utterance: &Utterance) -> Classification {
        if let Some(reason) = deterministic_multi(&utterance.folded()) {
            debug!("deterministic multi: {reason}");
            return Classification::Multi;
        }

        let request = GenerateRequest::new(
            SYSTEM_PROMPT,
            &utterance.text,
            OutputShape::Choice(vec!["single".into(), "multi".into()]),
        );
        match generate_checked(self.provider, &request).await {
            Ok(value) => {
                if value.as_str() == Some("single") {
                    Classification::Single
                } else {
                    Classification::Multi
                }
            }
            Err(e) => {
                warn!("classifier fallback to multi: {e}");
                Classification::Multi
            }
        }
    }
}

/// Scan the case-folded utterance for multi-goal markers. Returns the
/// matched family for logging, or `None` when no pattern fires.
fn deterministic_multi(folded: &str) -> Option<&'static str> {
    let words: Vec<&str> = folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    for pair in words.windows(2) {
        if DEPENDENCY_BIGRAMS
            .iter()
            .any(|(a, b)| pair[0] == *a && pair[1] == *b)
        {
            return Some("dependency marker");
        }
    }
    if words.contains(&"then") {
        return Some("sequence marker");
    }

    // `<launch-verb> <object> and <launch-verb> <object>`
    for (j, word) in words.iter().enumerate() {
        if *word != "and" {
            continue;
        }
        let second_is_launch = words
            .get(j + 1)
            .is_some_and(|w| LAUNCH_VERBS.contains(w))
            && words.get(j + 2).is_some();
        let first_is_launch = (0..j.saturating_sub(1))
            .any(|i| LAUNCH_VERBS.contains(&words[i]) && i + 1 < j);
        if second_is_launch && first_is_launch {
            return Some("independent launch pair");
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorldState;
    use crate::provider::ScriptedProvider;
    use serde_json::json;

    fn utterance(text: &str) -> Utterance {
        Utterance::new(text, None, WorldState::bare("/w", "/h"))
    }

    #[test]
    fn dependency_markers_fire() {
        assert!(deterministic_multi("create folder alex and put a file inside it").is_some());
        assert!(deterministic_multi("make a folder, then open it").is_some());
        assert!(deterministic_multi("copy the file into that").is_some());
        assert!(deterministic_multi("mute sound after that lock screen").is_some());
    }

    #[test]
    fn launch_pair_fires() {
        assert!(deterministic_multi("open chrome and open spotify").is_some());
        assert!(deterministic_multi("launch code and start spotify").is_some());
    }

    #[test]
    fn single_action_does_not_fire() {
        assert!(deterministic_multi("open youtube and search nvidia").is_none());
        assert!(deterministic_multi("what time is it").is_none());
        assert!(deterministic_multi("set volume to 50 percent").is_none());
    }

    #[tokio::test]
    async fn llm_fallback_single() {
        let provider = ScriptedProvider::new().reply(json!("single"));
        let classifier = QueryClassifier::new(&provider);
        let result = classifier
            .classify(&utterance("open youtube and search nvidia"))
            .await;
        assert_eq!(result, Classification::Single);
    }

    #[tokio::test]
    async fn deterministic_path_skips_provider() {
        // No scripted replies: a provider call would fail, so a Multi
        // result proves the scan answered on its own.
        let provider = ScriptedProvider::new();
        let classifier = QueryClassifier::new(&provider);
        let result = classifier
            .classify(&utterance("open chrome and open spotify"))
            .await;
        assert_eq!(result, Classification::Multi);
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_multi() {
        let provider = ScriptedProvider::new();
        let classifier = QueryClassifier::new(&provider);
        let result = classifier.classify(&utterance("do the thing")).await;
        assert_eq!(result, Classification::Multi);
    }

    #[tokio::test]
    async fn classification_is_idempotent() {
        let provider = ScriptedProvider::new()
            .reply(json!("single"))
            .reply(json!("single"));
        let classifier = QueryClassifier::new(&provider);
        let u = utterance("play some jazz");
        let first = classifier.classify(&u).await;
        let second = classifier.classify(&u).await;
        assert_eq!(first, second);
    }
}
