//! The planner rules table.
//!
//! Behavior lives here as data, keyed by `(domain, verb)`. The planner
//! body reads rule fields and nothing else — adding a verb to the system
//! is an edit to [`PlannerRules::standard`], not new code.

use crate::model::{ActionClass, Intent, Params, param_str};
use std::collections::HashMap;

/// Fill a missing planner param from an upstream context frame.
#[derive(Debug, Clone)]
pub struct ContextBinding {
    /// The param to fill when the goal did not provide it.
    pub param: &'static str,
    /// Frame domain to search.
    pub domain: &'static str,
    /// Key inside the frame's data.
    pub key: &'static str,
}

/// Context frame emitted after successful validation.
#[derive(Debug, Clone)]
pub struct ContextProduction {
    pub domain: &'static str,
    /// Params copied into the frame, when present.
    pub keys: &'static [&'static str],
}

/// One planning rule.
#[derive(Debug, Clone)]
pub struct PlannerRule {
    /// Intent tag attached to the emitted action.
    pub intent: Intent,
    pub action_class: ActionClass,
    /// Format string over params, e.g. `"navigate:{url}"`.
    pub description_template: &'static str,
    pub required_params: &'static [&'static str],
    pub default_params: &'static [(&'static str, &'static str)],
    /// Param name → closed value set.
    pub allowed_values: &'static [(&'static str, &'static [&'static str])],
    /// Accept the goal without its technical params; the planner then
    /// emits a context-producing action instead of a tool call.
    pub allow_semantic_only: bool,
    pub context_consumption: &'static [ContextBinding],
    pub context_production: Option<ContextProduction>,
}

impl PlannerRule {
    fn new(
        intent: Intent,
        action_class: ActionClass,
        description_template: &'static str,
        required_params: &'static [&'static str],
    ) -> Self {
        Self {
            intent,
            action_class,
            description_template,
            required_params,
            default_params: &[],
            allowed_values: &[],
            allow_semantic_only: false,
            context_consumption: &[],
            context_production: None,
        }
    }
}

/// The `(domain, verb)` → rule map.
pub struct PlannerRules {
    map: HashMap<(String, String), PlannerRule>,
}

impl PlannerRules {
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn insert(&mut self, domain: &str, verb: &str, rule: PlannerRule) {
        self.map.insert((domain.to_string(), verb.to_string()), rule);
    }

    pub fn get(&self, domain: &str, verb: &str) -> Option<&PlannerRule> {
        self.map.get(&(domain.to_string(), verb.to_string()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The standard rule set for the default tool surface.
    pub fn standard() -> Self {
        let mut rules = Self::empty();

        rules.insert(
            "app",
            "launch",
            PlannerRule {
                context_production: Some(ContextProduction {
                    domain: "app",
                    keys: &["app"],
                }),
                ..PlannerRule::new(
                    Intent::ApplicationLaunch,
                    ActionClass::Actuate,
                    "launch:{app}",
                    &["app"],
                )
            },
        );
        rules.insert(
            "app",
            "focus",
            PlannerRule {
                context_consumption: &[ContextBinding {
                    param: "app",
                    domain: "app",
                    key: "app",
                }],
                ..PlannerRule::new(
                    Intent::WindowManagement,
                    ActionClass::Actuate,
                    "focus:{app}",
                    &["app"],
                )
            },
        );

        rules.insert(
            "browser",
            "navigate",
            PlannerRule {
                context_production: Some(ContextProduction {
                    domain: "browser",
                    keys: &["url"],
                }),
                ..PlannerRule::new(
                    Intent::BrowserControl,
                    ActionClass::Actuate,
                    "navigate:{url}",
                    &["url"],
                )
            },
        );
        rules.insert(
            "browser",
            "search",
            PlannerRule::new(
                Intent::BrowserControl,
                ActionClass::Actuate,
                "search:{query}",
                &["query"],
            ),
        );
        // A session reference without technical params: plans to a
        // context-only action that later browser goals can consume.
        rules.insert(
            "browser",
            "session",
            PlannerRule {
                allow_semantic_only: true,
                context_production: Some(ContextProduction {
                    domain: "browser",
                    keys: &["url"],
                }),
                ..PlannerRule::new(
                    Intent::BrowserControl,
                    ActionClass::Observe,
                    "session:{url}",
                    &["url"],
                )
            },
        );

        rules.insert(
            "file",
            "create",
            PlannerRule {
                allowed_values: &[("object_type", &["folder", "file"])],
                context_production: Some(ContextProduction {
                    domain: "file",
                    keys: &["path", "target"],
                }),
                ..PlannerRule::new(
                    Intent::FileOperation,
                    ActionClass::Actuate,
                    "create:{object_type}:{path}",
                    &["object_type", "path"],
                )
            },
        );
        rules.insert(
            "file",
            "delete",
            PlannerRule::new(
                Intent::FileOperation,
                ActionClass::Actuate,
                "delete:{path}",
                &["path"],
            ),
        );
        rules.insert(
            "file",
            "list",
            PlannerRule {
                default_params: &[("path", ".")],
                ..PlannerRule::new(
                    Intent::FileOperation,
                    ActionClass::Observe,
                    "list:{path}",
                    &["path"],
                )
            },
        );

        rules.insert(
            "system",
            "set_volume",
            PlannerRule::new(
                Intent::SystemControl,
                ActionClass::Actuate,
                "volume:{level}",
                &["level"],
            ),
        );
        rules.insert(
            "system",
            "lock",
            PlannerRule::new(
                Intent::SystemControl,
                ActionClass::Actuate,
                "lock:screen",
                &[],
            ),
        );

        rules.insert(
            "input",
            "click",
            PlannerRule::new(
                Intent::InputControl,
                ActionClass::Actuate,
                "click:{x},{y}",
                &["x", "y"],
            ),
        );
        rules.insert(
            "input",
            "type",
            PlannerRule::new(
                Intent::InputControl,
                ActionClass::Actuate,
                "type:{text}",
                &["text"],
            ),
        );

        rules
    }
}

impl Default for PlannerRules {
    fn default() -> Self {
        Self::standard()
    }
}

/// Render a `{key}`-style template over a param map. Every placeholder
/// must be present: the planner validates required params first, so a
/// miss here means the rule's template names a param it never required.
pub fn render_template(template: &str, params: &Params) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(format!("unclosed placeholder in template '{template}'"));
        };
        let key = &after[..end];
        match param_str(params, key) {
            Some(value) => out.push_str(&value),
            None => return Err(format!("template param '{key}' missing")),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
