//! Request input types: the raw utterance and the ambient-state snapshot.

use chrono::{DateTime, Utc};

/// Frozen snapshot of ambient OS and session state, captured once at
/// request entry. Planners read it for decisions; nothing mutates it.
#[derive(Debug, Clone)]
pub struct WorldState {
    /// Names of applications currently running (lowercased).
    pub running_apps: Vec<String>,
    /// Title of the focused window, if any window has focus.
    pub focused_window: Option<String>,
    /// Whether a managed browser session already exists.
    pub browser_session_active: bool,
    /// Whether clipboard contents are available to read.
    pub clipboard_available: bool,
    /// Whether the screen is currently locked.
    pub screen_locked: bool,
    /// Recently surfaced facts (small, advisory strings).
    pub recent_facts: Vec<String>,
    /// The session working directory, captured once at request start.
    /// Path resolution anchors here by default; nothing re-reads the
    /// live process cwd after this snapshot.
    pub workspace: String,
    /// The user's home directory, for named anchors (desktop, documents).
    pub home_dir: String,
    /// When this snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

impl WorldState {
    /// A minimal snapshot for tests and headless runs: empty ambient
    /// state, explicit workspace and home directories.
    pub fn bare(workspace: impl Into<String>, home_dir: impl Into<String>) -> Self {
        Self {
            running_apps: Vec::new(),
            focused_window: None,
            browser_session_active: false,
            clipboard_available: false,
            screen_locked: false,
            recent_facts: Vec::new(),
            workspace: workspace.into(),
            home_dir: home_dir.into(),
            captured_at: Utc::now(),
        }
    }

    /// Whether an application with this (case-insensitive) name is running.
    pub fn is_running(&self, app: &str) -> bool {
        let needle = app.to_lowercase();
        self.running_apps.iter().any(|a| a.to_lowercase() == needle)
    }
}

/// Source of [`WorldState`] snapshots. Called exactly once per request,
/// at entry; the returned value is immutable for the request's lifetime.
pub trait WorldStateProvider: Send + Sync {
    fn snapshot(&self) -> WorldState;
}

/// Captures the real process environment: cwd as workspace (unless pinned
/// with [`rooted`](LocalWorldState::rooted)), `HOME` (or `USERPROFILE`) as
/// the home directory. Ambient fields default to empty; richer collection
/// lives outside the core.
#[derive(Debug, Default)]
pub struct LocalWorldState {
    workspace: Option<String>,
}

impl LocalWorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the workspace to an explicit directory. Snapshots then never
    /// consult the process cwd.
    pub fn rooted(workspace: impl Into<String>) -> Self {
        Self {
            workspace: Some(workspace.into()),
        }
    }
}

impl WorldStateProvider for LocalWorldState {
    fn snapshot(&self) -> WorldState {
        let workspace = self.workspace.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string())
        });
        let home_dir = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| workspace.clone());
        WorldState::bare(workspace, home_dir)
    }
}

/// The raw user text for one request, plus its session identifier and the
/// world snapshot taken at entry. Constructed once, discarded when the
/// final response is returned.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub session_id: Option<String>,
    pub world: WorldState,
}

impl Utterance {
    pub fn new(text: impl Into<String>, session_id: Option<String>, world: WorldState) -> Self {
        Self {
            text: text.into(),
            session_id,
            world,
        }
    }

    /// Case-folded text for deterministic marker scans.
    pub fn folded(&self) -> String {
        self.text.to_lowercase()
    }
}
