//! Immutable value types that cross stage boundaries.
//!
//! Everything in this module is frozen after construction: stages receive
//! these types by value or by shared reference and never mutate them.
//! Constructors enforce the structural invariants (DAG validity, id
//! uniqueness, confidence ranges); a constructor error is a programmer
//! error, not a runtime condition.

pub mod goal;
pub mod intent;
pub mod plan;
pub mod world;

pub use goal::{BaseAnchor, Goal, MetaGoal, MetaType, Scope};
pub use intent::{Classification, Intent, IntentDecision, IntentReport};
pub use plan::{
    ActionClass, ContextFrame, Params, Plan, PlanGraph, PlannedAction, param_str,
};
pub use world::{LocalWorldState, Utterance, WorldState, WorldStateProvider};
