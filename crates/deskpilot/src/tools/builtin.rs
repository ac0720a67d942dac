//! The default tool registry.
//!
//! Filesystem tools run against `std::fs` for real. OS-surface tools
//! (app launch, browser, audio, input, power) are simulated: they record
//! what they would have done into an [`ActionRecorder`], which is enough
//! to drive the CLI end-to-end and to test precondition enforcement
//! without touching a desktop.

use super::{
    Capability, Effect, Precondition, ToolExec, ToolFuture, ToolInvocation, ToolOutcome,
    ToolRegistry,
};
use crate::json_schema_for;
use crate::model::{Intent, param_str};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::{Arc, Mutex};

// ── Invocation recording ───────────────────────────────────────────

/// Shared log of simulated tool invocations. Cloning shares the buffer.
#[derive(Debug, Clone, Default)]
pub struct ActionRecorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ActionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.into());
    }

    /// Snapshot of everything recorded so far.
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// A tool that records its invocation instead of acting. The recorded
/// line is `<name> <key=value …> [session=<id>]`.
pub struct SimulatedTool {
    name: &'static str,
    recorder: ActionRecorder,
}

impl SimulatedTool {
    pub fn new(name: &'static str, recorder: ActionRecorder) -> Self {
        Self { name, recorder }
    }
}

impl ToolExec for SimulatedTool {
    fn invoke(&self, invocation: ToolInvocation) -> ToolFuture<'_> {
        let name = self.name;
        let recorder = self.recorder.clone();
        Box::pin(async move {
            let mut line = String::from(name);
            for (key, value) in &invocation.args {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                line.push_str(&format!(" {key}={rendered}"));
            }
            if let Some(session) = &invocation.session_id {
                line.push_str(&format!(" session={session}"));
            }
            recorder.record(line);
            ToolOutcome::ok(format!("{name}: done"))
        })
    }
}

// ── Filesystem tools ───────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct PathArgs {
    /// Absolute path produced by path resolution.
    path: String,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct CreateFileArgs {
    path: String,
    /// Initial contents; empty file when omitted.
    #[serde(default)]
    content: Option<String>,
}

/// Creates a directory (and any missing parents).
pub struct CreateFolder;

impl ToolExec for CreateFolder {
    fn invoke(&self, invocation: ToolInvocation) -> ToolFuture<'_> {
        Box::pin(async move {
            let Some(path) = param_str(&invocation.args, "path") else {
                return ToolOutcome::err("missing 'path'");
            };
            match std::fs::create_dir_all(&path) {
                Ok(()) => ToolOutcome::ok(format!("created folder {path}")),
                Err(e) => ToolOutcome::err(format!("failed to create folder {path}: {e}")),
            }
        })
    }
}

/// Creates a file, writing optional initial content.
pub struct CreateFile;

impl ToolExec for CreateFile {
    fn invoke(&self, invocation: ToolInvocation) -> ToolFuture<'_> {
        Box::pin(async move {
            let Some(path) = param_str(&invocation.args, "path") else {
                return ToolOutcome::err("missing 'path'");
            };
            let content = param_str(&invocation.args, "content").unwrap_or_default();
            match std::fs::write(&path, content) {
                Ok(()) => ToolOutcome::ok(format!("created file {path}")),
                Err(e) => ToolOutcome::err(format!("failed to create file {path}: {e}")),
            }
        })
    }
}

/// Removes a file or directory tree. Destructive.
pub struct DeleteEntry;

impl ToolExec for DeleteEntry {
    fn invoke(&self, invocation: ToolInvocation) -> ToolFuture<'_> {
        Box::pin(async move {
            let Some(path) = param_str(&invocation.args, "path") else {
                return ToolOutcome::err("missing 'path'");
            };
            let meta = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => return ToolOutcome::err(format!("cannot delete {path}: {e}")),
            };
            let result = if meta.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => ToolOutcome::ok(format!("deleted {path}")),
                Err(e) => ToolOutcome::err(format!("failed to delete {path}: {e}")),
            }
        })
    }
}

/// Lists directory entries, name-sorted.
pub struct ListEntries;

impl ToolExec for ListEntries {
    fn invoke(&self, invocation: ToolInvocation) -> ToolFuture<'_> {
        Box::pin(async move {
            let Some(path) = param_str(&invocation.args, "path") else {
                return ToolOutcome::err("missing 'path'");
            };
            let entries = match std::fs::read_dir(&path) {
                Ok(e) => e,
                Err(e) => return ToolOutcome::err(format!("cannot list {path}: {e}")),
            };
            let mut names: Vec<String> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            ToolOutcome::ok_with(
                format!("{} entries in {path}", names.len()),
                serde_json::json!({ "entries": names }),
            )
        })
    }
}

// ── Default registry ───────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct LaunchArgs {
    /// Application name, e.g. "chrome".
    app: String,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct NavigateArgs {
    /// Absolute URL to open.
    url: String,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct SearchArgs {
    /// Search query text.
    query: String,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct VolumeArgs {
    /// Volume level, 0–100.
    level: u32,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct ClickArgs {
    x: i64,
    y: i64,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct TypeArgs {
    /// Text to type into the focused control.
    text: String,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct EmptyArgs {}

/// Build the standard registry: real file tools plus simulated OS tools
/// wired to `recorder`.
pub fn standard_registry(recorder: &ActionRecorder) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // Filesystem.
    registry.register(
        Capability::new("files.create_folder", json_schema_for::<PathArgs>())
            .intents(&[Intent::FileOperation])
            .effects(&[Effect::CreatesEntry]),
        CreateFolder,
    );
    registry.register(
        Capability::new("files.create_file", json_schema_for::<CreateFileArgs>())
            .intents(&[Intent::FileOperation])
            .effects(&[Effect::CreatesEntry]),
        CreateFile,
    );
    registry.register(
        Capability::new("files.delete", json_schema_for::<PathArgs>())
            .intents(&[Intent::FileOperation])
            .effects(&[Effect::RemovesEntry])
            .destructive(),
        DeleteEntry,
    );
    registry.register(
        Capability::new("files.list", json_schema_for::<PathArgs>())
            .intents(&[Intent::FileOperation]),
        ListEntries,
    );

    // Applications and browser.
    registry.register(
        Capability::new("system.apps.launch", json_schema_for::<LaunchArgs>())
            .intents(&[Intent::ApplicationLaunch, Intent::BrowserControl])
            .effects(&[Effect::LaunchesApp]),
        SimulatedTool::new("system.apps.launch", recorder.clone()),
    );
    registry.register(
        Capability::new("browser.navigate", json_schema_for::<NavigateArgs>())
            .intents(&[Intent::BrowserControl])
            .effects(&[Effect::NavigatesBrowser])
            .session_bound(),
        SimulatedTool::new("browser.navigate", recorder.clone()),
    );
    registry.register(
        Capability::new("browser.search", json_schema_for::<SearchArgs>())
            .intents(&[Intent::BrowserControl])
            .effects(&[Effect::NavigatesBrowser])
            .session_bound(),
        SimulatedTool::new("browser.search", recorder.clone()),
    );

    // System surfaces.
    registry.register(
        Capability::new("system.audio.set_volume", json_schema_for::<VolumeArgs>())
            .intents(&[Intent::SystemControl, Intent::MediaControl])
            .effects(&[Effect::ChangesAudio]),
        SimulatedTool::new("system.audio.set_volume", recorder.clone()),
    );
    registry.register(
        Capability::new("system.power.lock", json_schema_for::<EmptyArgs>())
            .intents(&[Intent::SystemControl])
            .preconditions(&[Precondition::RequiresUnlockedScreen])
            .effects(&[Effect::LocksScreen]),
        SimulatedTool::new("system.power.lock", recorder.clone()),
    );

    // Raw input: reachable only through the input_control intent.
    registry.register(
        Capability::new("system.input.mouse.click", json_schema_for::<ClickArgs>())
            .intents(&[Intent::InputControl])
            .preconditions(&[Precondition::RequiresUnlockedScreen])
            .effects(&[Effect::EmitsInput]),
        SimulatedTool::new("system.input.mouse.click", recorder.clone()),
    );
    registry.register(
        Capability::new("system.input.keyboard.type", json_schema_for::<TypeArgs>())
            .intents(&[Intent::InputControl])
            .preconditions(&[
                Precondition::RequiresFocus,
                Precondition::RequiresUnlockedScreen,
            ])
            .effects(&[Effect::EmitsInput, Effect::HoldsModifiers]),
        SimulatedTool::new("system.input.keyboard.type", recorder.clone()),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Params;
    use serde_json::json;

    fn args(pairs: &[(&str, serde_json::Value)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn create_folder_and_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ActionRecorder::new();
        let registry = standard_registry(&recorder);

        let folder = dir.path().join("alex").display().to_string();
        let outcome = registry
            .invoke(
                "files.create_folder",
                ToolInvocation {
                    args: args(&[("path", json!(folder))]),
                    session_id: None,
                },
            )
            .await;
        assert!(outcome.is_success(), "{}", outcome.message);

        let file = dir.path().join("alex/notes.txt").display().to_string();
        let outcome = registry
            .invoke(
                "files.create_file",
                ToolInvocation {
                    args: args(&[("path", json!(file.clone())), ("content", json!("hi"))]),
                    session_id: None,
                },
            )
            .await;
        assert!(outcome.is_success(), "{}", outcome.message);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hi");
    }

    #[tokio::test]
    async fn delete_missing_entry_errors() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ActionRecorder::new();
        let registry = standard_registry(&recorder);
        let ghost = dir.path().join("nope").display().to_string();
        let outcome = registry
            .invoke(
                "files.delete",
                ToolInvocation {
                    args: args(&[("path", json!(ghost))]),
                    session_id: None,
                },
            )
            .await;
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn list_entries_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let recorder = ActionRecorder::new();
        let registry = standard_registry(&recorder);
        let outcome = registry
            .invoke(
                "files.list",
                ToolInvocation {
                    args: args(&[("path", json!(dir.path().display().to_string()))]),
                    session_id: None,
                },
            )
            .await;
        assert!(outcome.is_success());
        assert_eq!(
            outcome.data.unwrap()["entries"],
            json!(["a.txt", "b.txt"])
        );
    }

    #[tokio::test]
    async fn simulated_tool_records_args_and_session() {
        let recorder = ActionRecorder::new();
        let registry = standard_registry(&recorder);
        let outcome = registry
            .invoke(
                "browser.navigate",
                ToolInvocation {
                    args: args(&[("url", json!("https://example.com"))]),
                    session_id: Some("sess-1".into()),
                },
            )
            .await;
        assert!(outcome.is_success());
        let entries = recorder.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].contains("url=https://example.com"));
        assert!(entries[0].contains("session=sess-1"));
    }

    #[test]
    fn registry_has_expected_surface() {
        let registry = standard_registry(&ActionRecorder::new());
        assert!(registry.has("files.create_folder"));
        assert!(registry.has("system.input.mouse.click"));
        assert!(registry.get("files.delete").unwrap().is_destructive);
        assert!(registry.get("browser.navigate").unwrap().requires_session);
        assert_eq!(registry.list_by_prefix("system.input.").len(), 2);
    }
}
