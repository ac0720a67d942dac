//! Routing and intent tags.
//!
//! Both enums here are closed sets matched exhaustively at boundaries.
//! Adding a tag is a deliberate change that touches the classifier prompt,
//! the resolver domain tables, and the planner rules together.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing decision from the query classifier: one atomic goal, or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Single,
    Multi,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Single => write!(f, "single"),
            Classification::Multi => write!(f, "multi"),
        }
    }
}

/// High-level category of a single-goal utterance.
///
/// Declared once by the intent classifier and passed downstream immutably;
/// no later stage re-derives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ApplicationLaunch,
    FileOperation,
    SystemControl,
    BrowserControl,
    InformationQuery,
    InputControl,
    WindowManagement,
    Clipboard,
    MediaControl,
    Screenshot,
    ProcessControl,
    NetworkQuery,
    Scheduling,
    Conversation,
    Unknown,
}

impl Intent {
    /// Every tag, in prompt-enumeration order.
    pub const ALL: &'static [Intent] = &[
        Intent::ApplicationLaunch,
        Intent::FileOperation,
        Intent::SystemControl,
        Intent::BrowserControl,
        Intent::InformationQuery,
        Intent::InputControl,
        Intent::WindowManagement,
        Intent::Clipboard,
        Intent::MediaControl,
        Intent::Screenshot,
        Intent::ProcessControl,
        Intent::NetworkQuery,
        Intent::Scheduling,
        Intent::Conversation,
        Intent::Unknown,
    ];

    /// The snake_case tag used on the wire and in prompts.
    pub fn tag(&self) -> &'static str {
        match self {
            Intent::ApplicationLaunch => "application_launch",
            Intent::FileOperation => "file_operation",
            Intent::SystemControl => "system_control",
            Intent::BrowserControl => "browser_control",
            Intent::InformationQuery => "information_query",
            Intent::InputControl => "input_control",
            Intent::WindowManagement => "window_management",
            Intent::Clipboard => "clipboard",
            Intent::MediaControl => "media_control",
            Intent::Screenshot => "screenshot",
            Intent::ProcessControl => "process_control",
            Intent::NetworkQuery => "network_query",
            Intent::Scheduling => "scheduling",
            Intent::Conversation => "conversation",
            Intent::Unknown => "unknown",
        }
    }

    /// Parse a wire tag. Unrecognized tags return `None`; callers decide
    /// whether that downgrades to [`Intent::Unknown`].
    pub fn from_tag(tag: &str) -> Option<Intent> {
        Intent::ALL.iter().copied().find(|i| i.tag() == tag)
    }

    /// Intents that are answered directly by the provider, bypassing tool
    /// resolution entirely.
    pub fn is_answer_only(&self) -> bool {
        matches!(self, Intent::InformationQuery | Intent::Conversation)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Act on the utterance, or ask the user a clarifying question first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentDecision {
    Act,
    Ask,
}

/// Output of the intent classifier for a `Single`-routed utterance.
#[derive(Debug, Clone)]
pub struct IntentReport {
    pub decision: IntentDecision,
    pub intent: Intent,
    /// Clamped to [0, 1] at construction.
    pub confidence: f64,
    pub question: Option<String>,
}

impl IntentReport {
    pub fn new(
        decision: IntentDecision,
        intent: Intent,
        confidence: f64,
        question: Option<String>,
    ) -> Self {
        Self {
            decision,
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            question,
        }
    }

    /// The fallback report for schema-invalid classifier output.
    pub fn unknown() -> Self {
        Self::new(IntentDecision::Act, Intent::Unknown, 0.0, None)
    }
}
