//! Parametric goals, the scope grammar, and the `MetaGoal` DAG.

use crate::model::plan::{Params, param_str};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Symbolic root for path resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseAnchor {
    /// A drive root such as `D:\`.
    Drive(char),
    Desktop,
    Documents,
    Downloads,
    /// The session working directory captured at request start.
    Workspace,
}

impl fmt::Display for BaseAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseAnchor::Drive(letter) => write!(f, "drive:{letter}"),
            BaseAnchor::Desktop => write!(f, "desktop"),
            BaseAnchor::Documents => write!(f, "documents"),
            BaseAnchor::Downloads => write!(f, "downloads"),
            BaseAnchor::Workspace => write!(f, "workspace"),
        }
    }
}

/// A goal's scope string, parsed into its small grammar.
///
/// Scope encodes exactly one of: independence (`root`), an ordering
/// dependency (`after:...`), a containment dependency (`inside:...`), or a
/// base anchor for path resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Root,
    /// Depends on the first earlier goal with this verb.
    AfterVerb(String),
    /// Depends on the goal with this id, if it is earlier.
    AfterGoal(String),
    /// Contained in the identity named by the target (or, for anaphors
    /// like "it", the most recently opened container).
    Inside(String),
    /// Sets the base anchor; implies no dependency by itself.
    Anchor(BaseAnchor),
}

impl Scope {
    /// Parse a scope string. Unknown tokens degrade to `Root`; the
    /// interpreter logs them, and they never abort a request.
    pub fn parse(raw: &str) -> Scope {
        let trimmed = raw.trim().to_lowercase();
        if trimmed.is_empty() || trimmed == "root" {
            return Scope::Root;
        }
        if let Some(rest) = trimmed.strip_prefix("after:") {
            let rest = rest.trim();
            // Goal ids are `g<digits>`; anything else is a verb reference.
            let is_goal_id = rest.strip_prefix('g').is_some_and(|digits| {
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
            });
            return if is_goal_id {
                Scope::AfterGoal(rest.to_string())
            } else {
                Scope::AfterVerb(rest.to_string())
            };
        }
        if let Some(target) = trimmed.strip_prefix("inside:") {
            return Scope::Inside(target.trim().to_string());
        }
        if let Some(letter) = trimmed.strip_prefix("drive:") {
            if let Some(c) = letter.trim().chars().next() {
                return Scope::Anchor(BaseAnchor::Drive(c.to_ascii_uppercase()));
            }
        }
        match trimmed.as_str() {
            "desktop" => Scope::Anchor(BaseAnchor::Desktop),
            "documents" => Scope::Anchor(BaseAnchor::Documents),
            "downloads" => Scope::Anchor(BaseAnchor::Downloads),
            "workspace" => Scope::Anchor(BaseAnchor::Workspace),
            _ => Scope::Root,
        }
    }

    /// Whether this scope establishes a dependency on an earlier goal.
    pub fn is_dependent(&self) -> bool {
        matches!(
            self,
            Scope::AfterVerb(_) | Scope::AfterGoal(_) | Scope::Inside(_)
        )
    }
}

/// One desired effect: domain + verb + params + scope.
///
/// `domain` and `verb` are open strings here; validity is enforced at
/// planning time against the rules table. `resolved_path` is filled by the
/// orchestrator for file-domain goals. Until then, any raw path in
/// `params` is an identity name only.
#[derive(Debug, Clone)]
pub struct Goal {
    pub domain: String,
    pub verb: String,
    pub params: Params,
    pub object: Option<String>,
    pub scope: Scope,
    /// Opaque id (`g0`, `g1`, …) assigned sequentially by the interpreter.
    pub goal_id: String,
    /// Authoritative absolute path, written by the orchestrator's path
    /// resolver for file-domain goals.
    pub resolved_path: Option<String>,
}

impl Goal {
    pub fn new(
        domain: impl Into<String>,
        verb: impl Into<String>,
        params: Params,
        object: Option<String>,
        scope: Scope,
        goal_id: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            verb: verb.into(),
            params,
            object: object.map(|o| o.trim().to_string()),
            scope,
            goal_id: goal_id.into(),
            resolved_path: None,
        }
    }

    /// Whether this goal belongs to the file domain (and therefore gets
    /// authoritative path resolution).
    pub fn is_file_domain(&self) -> bool {
        self.domain == "file" || self.domain.starts_with("file.")
    }

    /// The name this goal is known by for containment matching: the
    /// explicit object, else the `target` param, else the final component
    /// of a raw `path` param.
    pub fn identity(&self) -> Option<String> {
        if let Some(object) = &self.object
            && !object.is_empty()
        {
            return Some(object.clone());
        }
        if let Some(target) = param_str(&self.params, "target") {
            return Some(target);
        }
        param_str(&self.params, "path")
            .map(|p| {
                p.rsplit(['/', '\\'])
                    .next()
                    .unwrap_or(p.as_str())
                    .to_string()
            })
            .filter(|s| !s.is_empty())
    }
}

/// How the goals of a request relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaType {
    Single,
    IndependentMulti,
    DependentMulti,
}

/// The interpreter's output: an ordered tuple of goals plus a dependency
/// DAG over their indices. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct MetaGoal {
    pub meta_type: MetaType,
    pub goals: Vec<Goal>,
    /// Child index → parent indices. Always acyclic; parents are always
    /// earlier than children.
    pub dependencies: BTreeMap<usize, Vec<usize>>,
    /// Set when structured interpretation failed and the legacy
    /// decomposition path should handle the utterance.
    pub fallback: bool,
}

impl MetaGoal {
    /// Build a `MetaGoal`, enforcing the DAG invariants. A violation is a
    /// programmer error in the caller (the interpreter filters bad edges
    /// before constructing).
    pub fn new(
        meta_type: MetaType,
        goals: Vec<Goal>,
        dependencies: BTreeMap<usize, Vec<usize>>,
    ) -> Result<Self, String> {
        for (&child, parents) in &dependencies {
            if child >= goals.len() {
                return Err(format!("dependency child {child} out of range"));
            }
            for &parent in parents {
                if parent >= goals.len() {
                    return Err(format!("dependency parent {parent} out of range"));
                }
                if parent == child {
                    return Err(format!("goal {child} depends on itself"));
                }
                if parent > child {
                    return Err(format!(
                        "forward reference: goal {child} depends on later goal {parent}"
                    ));
                }
            }
        }
        if meta_type == MetaType::Single && (goals.len() != 1 || !dependencies.is_empty()) {
            return Err("single meta-goal must have exactly one goal and no dependencies".into());
        }
        Ok(Self {
            meta_type,
            goals,
            dependencies,
            fallback: false,
        })
    }

    /// Wrap one goal as a `Single` meta-goal.
    pub fn single(goal: Goal) -> Self {
        Self {
            meta_type: MetaType::Single,
            goals: vec![goal],
            dependencies: BTreeMap::new(),
            fallback: false,
        }
    }

    /// The parents of a goal index (empty if independent).
    pub fn parents_of(&self, index: usize) -> &[usize] {
        self.dependencies
            .get(&index)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
