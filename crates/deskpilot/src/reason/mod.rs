//! LLM-facing reasoning stages: routing, intent classification, and goal
//! interpretation.
//!
//! Each stage owns exactly one decision. The query classifier owns
//! single-vs-multi routing, the intent classifier owns the intent tag for
//! single-routed utterances, and the interpreter owns goal structure for
//! multi-routed ones. Nothing downstream re-derives any of these.

pub mod classify;
pub mod intent;
pub mod interpret;

pub use classify::QueryClassifier;
pub use intent::IntentClassifier;
pub use interpret::GoalInterpreter;
