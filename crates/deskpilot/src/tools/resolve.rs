//! Intent-bounded tool resolution.
//!
//! Maps `(intent, description, args)` to a concrete registered tool in two
//! stages. Stage 1 tries a direct lookup from the action's structured
//! description inside the intent's preferred domains. Stage 2 falls back
//! to a similarity search that is hard-restricted to the intent's allowed
//! domains (a stricter set) with a disallow list on top. Raw input
//! tools (`system.input.*`) are reachable only through the
//! `input_control` intent, never by fallback from anything else.
//!
//! The resolver chooses a name and nothing else: it never invents tools,
//! never rewrites the planner's args, never alters the intent.

use super::ToolRegistry;
use crate::error::PipelineError;
use crate::model::{Intent, PlannedAction};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Preferred tool-name prefixes per intent (stage 1).
pub fn preferred_domains(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::ApplicationLaunch => &["system.apps."],
        Intent::FileOperation => &["files."],
        Intent::SystemControl => &["system.audio.", "system.display.", "system.power."],
        Intent::BrowserControl => &["browser.", "system.apps."],
        Intent::InputControl => &["system.input."],
        Intent::WindowManagement => &["system.windows.", "system.apps."],
        Intent::Clipboard => &["system.clipboard."],
        Intent::MediaControl => &["system.media.", "system.audio."],
        Intent::Screenshot => &["system.display."],
        Intent::ProcessControl => &["system.process."],
        Intent::NetworkQuery => &["system.network."],
        Intent::Scheduling => &[],
        Intent::InformationQuery | Intent::Conversation | Intent::Unknown => &[],
    }
}

/// Allowed tool-name prefixes for the similarity fallback (stage 2).
/// Deliberately stricter than the preferred set.
pub fn allowed_domains(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::ApplicationLaunch => &["system.apps."],
        Intent::FileOperation => &["files."],
        Intent::SystemControl => &["system.audio.", "system.power."],
        Intent::BrowserControl => &["system.apps.launch"],
        Intent::InputControl => &["system.input."],
        Intent::WindowManagement => &["system.apps."],
        Intent::Clipboard => &["system.clipboard."],
        Intent::MediaControl => &["system.audio."],
        Intent::Screenshot => &["system.display."],
        Intent::ProcessControl => &[],
        Intent::NetworkQuery => &[],
        Intent::Scheduling => &[],
        Intent::InformationQuery | Intent::Conversation | Intent::Unknown => &[],
    }
}

/// Hard-excluded prefixes per intent, applied to both stages. Raw input is
/// opt-in: every intent except `input_control` disallows `system.input.*`.
pub fn disallowed_domains(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::InputControl => &[],
        _ => &["system.input."],
    }
}

/// Direct mappings from a structured-description head to a tool name.
/// Longest matching head wins.
const DESCRIPTION_TOOLS: &[(&str, &str)] = &[
    ("create:folder", "files.create_folder"),
    ("create:file", "files.create_file"),
    ("delete", "files.delete"),
    ("list", "files.list"),
    ("navigate", "browser.navigate"),
    ("search", "browser.search"),
    ("launch", "system.apps.launch"),
    ("volume", "system.audio.set_volume"),
    ("lock", "system.power.lock"),
    ("click", "system.input.mouse.click"),
    ("type", "system.input.keyboard.type"),
];

/// Chooses a registered tool for each planned action, within the
/// intent's domain lock.
pub struct ToolResolver {
    registry: Arc<ToolRegistry>,
}

impl ToolResolver {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve one action to a tool name, or `NoTool`.
    pub fn resolve(&self, action: &PlannedAction) -> Result<String, PipelineError> {
        let intent = action.intent;

        // Stage 1: direct lookup by structured description, restricted to
        // the intent's preferred domains.
        if let Some(name) = self.direct_lookup(intent, &action.description) {
            debug!(
                "resolved '{}' -> {name} (direct, intent {intent})",
                action.description
            );
            return Ok(name);
        }

        // Stage 2: similarity over the allowed (stricter) domains.
        if let Some(name) = self.similarity_lookup(intent, &action.description) {
            debug!(
                "resolved '{}' -> {name} (similarity, intent {intent})",
                action.description
            );
            return Ok(name);
        }

        warn!(
            "no tool for intent {intent} matching '{}'",
            action.description
        );
        Err(PipelineError::NoTool {
            intent: intent.tag().to_string(),
            description: action.description.clone(),
        })
    }

    fn direct_lookup(&self, intent: Intent, description: &str) -> Option<String> {
        let mut best: Option<(&str, &str)> = None;
        for (head, tool) in DESCRIPTION_TOOLS {
            if description.starts_with(head)
                && best.is_none_or(|(h, _)| head.len() > h.len())
            {
                best = Some((head, tool));
            }
        }
        let (_, tool) = best?;
        if !prefix_match(tool, preferred_domains(intent)) {
            return None;
        }
        if prefix_match(tool, disallowed_domains(intent)) {
            return None;
        }
        self.registry.has(tool).then(|| tool.to_string())
    }

    fn similarity_lookup(&self, intent: Intent, description: &str) -> Option<String> {
        let wanted: HashSet<String> = tokens(description).collect();
        if wanted.is_empty() {
            return None;
        }

        let mut candidates: Vec<&str> = Vec::new();
        for prefix in allowed_domains(intent) {
            for capability in self.registry.list_by_prefix(prefix) {
                if !prefix_match(&capability.name, disallowed_domains(intent)) {
                    candidates.push(capability.name.as_str());
                }
            }
        }
        candidates.sort();
        candidates.dedup();

        let mut best: Option<(usize, &str)> = None;
        for name in candidates {
            let score = tokens(name).filter(|t| wanted.contains(t)).count();
            if score > 0 && best.is_none_or(|(s, _)| score > s) {
                best = Some((score, name));
            }
        }
        best.map(|(_, name)| name.to_string())
    }
}

fn prefix_match(name: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| name.starts_with(p))
}

/// Lowercased alphanumeric tokens of a description or tool name.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}
