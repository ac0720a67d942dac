//! Authoritative path resolution for file-domain goals.
//!
//! This is the only place parent and child paths are combined. Planners
//! format resolved paths into descriptions and tools receive them as
//! args, but neither ever joins a base with a name.

use crate::model::{BaseAnchor, Goal, Scope, WorldState};
use tracing::debug;

/// Combines base anchors and per-goal identities into absolute paths.
pub struct PathResolver;

impl PathResolver {
    /// The absolute base for a named anchor.
    pub fn anchor_base(anchor: &BaseAnchor, world: &WorldState) -> String {
        match anchor {
            BaseAnchor::Drive(letter) => format!("{letter}:\\"),
            BaseAnchor::Desktop => join(&world.home_dir, "Desktop"),
            BaseAnchor::Documents => join(&world.home_dir, "Documents"),
            BaseAnchor::Downloads => join(&world.home_dir, "Downloads"),
            BaseAnchor::Workspace => world.workspace.clone(),
        }
    }

    /// Resolve one goal's absolute path.
    ///
    /// Precedence: an explicit base anchor on the goal's scope, then the
    /// parent's resolved path for containment dependencies, then the
    /// session workspace. The goal's identity (object or target name) is
    /// appended; a goal with no identity resolves to the base itself.
    pub fn resolve(goal: &Goal, parent_path: Option<&str>, world: &WorldState) -> String {
        let base = match &goal.scope {
            Scope::Anchor(anchor) => Self::anchor_base(anchor, world),
            _ => match parent_path {
                Some(parent) => parent.to_string(),
                None => world.workspace.clone(),
            },
        };
        let resolved = match goal.identity() {
            Some(name) => join(&base, &name),
            None => base,
        };
        debug!("resolved {} -> {resolved}", goal.goal_id);
        resolved
    }
}

/// Join a base and a name with the separator the base already uses.
/// Drive-rooted bases keep backslashes; everything else uses the
/// platform style already present in the base.
fn join(base: &str, name: &str) -> String {
    let sep = if base.contains(":\\") || base.contains('\\') {
        '\\'
    } else {
        '/'
    };
    let trimmed = base.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        // Base was just the separator (filesystem root).
        return format!("{sep}{name}");
    }
    format!("{trimmed}{sep}{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Params;

    fn world() -> WorldState {
        WorldState::bare("/home/user/work", "/home/user")
    }

    fn file_goal(id: &str, target: &str, scope: Scope) -> Goal {
        let mut params = Params::new();
        params.insert("target".into(), serde_json::json!(target));
        Goal::new("file", "create", params, Some(target.into()), scope, id)
    }

    #[test]
    fn drive_anchor_resolves_windows_style() {
        let goal = file_goal("g0", "alex", Scope::Anchor(BaseAnchor::Drive('D')));
        assert_eq!(PathResolver::resolve(&goal, None, &world()), "D:\\alex");
    }

    #[test]
    fn containment_inherits_parent_path() {
        let goal = file_goal("g1", "presentation.pptx", Scope::Inside("alex".into()));
        assert_eq!(
            PathResolver::resolve(&goal, Some("D:\\alex"), &world()),
            "D:\\alex\\presentation.pptx"
        );
    }

    #[test]
    fn default_base_is_workspace() {
        let goal = file_goal("g0", "notes.txt", Scope::Root);
        assert_eq!(
            PathResolver::resolve(&goal, None, &world()),
            "/home/user/work/notes.txt"
        );
    }

    #[test]
    fn named_anchors_hang_off_home() {
        let goal = file_goal("g0", "report.docx", Scope::Anchor(BaseAnchor::Documents));
        assert_eq!(
            PathResolver::resolve(&goal, None, &world()),
            "/home/user/Documents/report.docx"
        );
    }

    #[test]
    fn anchor_beats_parent() {
        // An explicit anchor on the goal overrides any inherited base.
        let goal = file_goal("g1", "fresh", Scope::Anchor(BaseAnchor::Drive('C')));
        assert_eq!(
            PathResolver::resolve(&goal, Some("D:\\alex"), &world()),
            "C:\\fresh"
        );
    }

    #[test]
    fn goal_without_identity_is_the_base() {
        let goal = Goal::new(
            "file",
            "list",
            Params::new(),
            None,
            Scope::Anchor(BaseAnchor::Drive('D')),
            "g0",
        );
        assert_eq!(PathResolver::resolve(&goal, None, &world()), "D:\\");
    }

    #[test]
    fn join_keeps_base_separator_style() {
        assert_eq!(join("D:\\", "alex"), "D:\\alex");
        assert_eq!(join("D:\\alex", "p.pptx"), "D:\\alex\\p.pptx");
        assert_eq!(join("/home/u/work", "notes.txt"), "/home/u/work/notes.txt");
        assert_eq!(join("/", "tmp"), "/tmp");
    }
}
