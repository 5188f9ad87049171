//! Trigger Matcher: maps one incoming hook event to zero or more
//! capture/retrieval actions via the six canonical triggers plus the
//! capture-only lifecycle triggers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::model::{Collection, MemoryType};

/// The closed set of event kinds the core recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStart,
    SessionEnd,
    PreCompact,
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
    PostToolUseError,
    Stop,
    ManualSave,
}

/// Tool output as delivered by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub output: Option<String>,
}

impl ToolOutput {
    fn combined_text(&self) -> String {
        [&self.stdout, &self.stderr, &self.output]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The structured event record read from stdin by the hook dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    pub event_kind: EventKind,
    pub cwd: std::path::PathBuf,
    pub session_id: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<serde_json::Value>,
    #[serde(default)]
    pub tool_output: Option<ToolOutput>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<std::path::PathBuf>,
}

/// Capture or retrieval mode for one matched action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Capture,
    Retrieval,
}

/// One matched action: a directive for the capture or retrieval engine.
#[derive(Debug, Clone)]
pub struct Action {
    pub mode: Mode,
    pub collection: Collection,
    pub type_hint: Option<MemoryType>,
    pub query: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Action {
    fn retrieval(collection: Collection, type_hint: MemoryType, query: impl Into<String>) -> Self {
        Self {
            mode: Mode::Retrieval,
            collection,
            type_hint: Some(type_hint),
            query: Some(query.into()),
            metadata: serde_json::Map::new(),
        }
    }

    fn capture(collection: Collection, type_hint: MemoryType, content: impl Into<String>) -> Self {
        Self {
            mode: Mode::Capture,
            collection,
            type_hint: Some(type_hint),
            query: Some(content.into()),
            metadata: serde_json::Map::new(),
        }
    }
}

static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(traceback|exception|error:|panicked at|fatal:)").unwrap());
static DECISION_PROMPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(why did we|what was the rationale|why do we)").unwrap());
static BEST_PRACTICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(how should i|best way to|what's the right way)").unwrap());
static SESSION_HISTORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(what have we done|where were we|what's the status)").unwrap());

/// Map one [`HookEvent`] to zero or more [`Action`]s. `has_prior_file_pattern`
/// gates the `PostToolUse` edit trigger: it should reflect whether a
/// `file_pattern` memory already covers `event`'s edited path, so the
/// retrieval fires only on the first edit to a path, not on every
/// subsequent one. Callers with no edited path in this event (or no
/// store to consult) may pass `false` unconditionally — it is ignored
/// for every other event kind.
#[must_use]
pub fn match_event(event: &HookEvent, has_prior_file_pattern: bool) -> Vec<Action> {
    let mut actions = Vec::new();

    match event.event_kind {
        EventKind::PostToolUseError => {
            if let Some(output) = &event.tool_output {
                let text = output.combined_text();
                if ERROR_RE.is_match(&text) {
                    let signature = error_signature(&text);
                    actions.push(Action::retrieval(
                        Collection::CodePatterns,
                        MemoryType::ErrorFix,
                        signature,
                    ));
                    actions.push(Action::capture(Collection::CodePatterns, MemoryType::ErrorFix, text));
                }
            }
        }
        EventKind::PostToolUse => {
            if is_file_creation(event) {
                actions.push(Action::retrieval(
                    Collection::Conventions,
                    MemoryType::Naming,
                    "naming and structure conventions",
                ));
            }
            if let Some(path) = edited_path(event) {
                if !has_prior_file_pattern {
                    actions.push(Action::retrieval(
                        Collection::CodePatterns,
                        MemoryType::FilePattern,
                        path,
                    ));
                }
            }
        }
        EventKind::UserPromptSubmit => {
            if let Some(prompt) = &event.prompt {
                if DECISION_PROMPT_RE.is_match(prompt) {
                    actions.push(Action::retrieval(Collection::Discussions, MemoryType::Decision, prompt.clone()));
                }
                if BEST_PRACTICE_RE.is_match(prompt) {
                    actions.push(Action::retrieval(Collection::Conventions, MemoryType::Rule, prompt.clone()));
                    actions.push(Action::retrieval(Collection::Conventions, MemoryType::Guideline, prompt.clone()));
                }
                if SESSION_HISTORY_RE.is_match(prompt) {
                    actions.push(Action::retrieval(Collection::Discussions, MemoryType::Session, prompt.clone()));
                    actions.push(Action::retrieval(Collection::Discussions, MemoryType::AgentHandoff, prompt.clone()));
                }
                actions.push(Action {
                    mode: Mode::Capture,
                    collection: Collection::Discussions,
                    type_hint: Some(MemoryType::Context),
                    query: Some(prompt.clone()),
                    metadata: serde_json::Map::new(),
                });
            }
        }
        EventKind::SessionStart => {
            actions.push(Action::retrieval(
                Collection::Discussions,
                MemoryType::AgentHandoff,
                "session continuity",
            ));
        }
        EventKind::SessionEnd | EventKind::PreCompact => {
            actions.push(Action::capture(
                Collection::Discussions,
                MemoryType::Session,
                "session summary",
            ));
        }
        EventKind::Stop => {
            actions.push(Action::capture(
                Collection::Discussions,
                MemoryType::AgentInsight,
                "agent response",
            ));
        }
        EventKind::ManualSave => {
            actions.push(Action::capture(Collection::Discussions, MemoryType::Context, "manual save"));
        }
        EventKind::PreToolUse => {}
    }

    actions
}

fn is_file_creation(event: &HookEvent) -> bool {
    let tool_name = event.tool_name.as_deref().unwrap_or_default().to_lowercase();
    matches!(tool_name.as_str(), "write" | "create" | "touch")
        && event
            .tool_input
            .as_ref()
            .and_then(|v| v.get("exists"))
            .and_then(serde_json::Value::as_bool)
            != Some(true)
}

/// The path an `edit`/`write` tool call touched, if any. Exposed so
/// callers can consult a store for prior `file_pattern` coverage before
/// deciding what to pass [`match_event`] as `has_prior_file_pattern`.
#[must_use]
pub fn edited_path(event: &HookEvent) -> Option<String> {
    let tool_name = event.tool_name.as_deref().unwrap_or_default().to_lowercase();
    if !matches!(tool_name.as_str(), "edit" | "write") {
        return None;
    }
    event
        .tool_input
        .as_ref()
        .and_then(|v| v.get("file_path").or_else(|| v.get("path")))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Normalize an error blob to a stable signature: the first non-empty
/// line, truncated, used to key `error_fix` retrieval.
fn error_signature(text: &str) -> String {
    text.lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or(text)
        .chars()
        .take(200)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn base_event(kind: EventKind) -> HookEvent {
        HookEvent {
            event_kind: kind,
            cwd: PathBuf::from("/tmp/proj"),
            session_id: "s1".to_string(),
            tool_name: None,
            tool_input: None,
            tool_output: None,
            prompt: None,
            transcript_path: None,
        }
    }

    #[test]
    fn error_output_triggers_capture_and_retrieval() {
        let mut event = base_event(EventKind::PostToolUseError);
        event.tool_output = Some(ToolOutput {
            stdout: None,
            stderr: Some("Traceback (most recent call last):\nValueError: bad input".to_string()),
            exit_code: Some(1),
            output: None,
        });
        let actions = match_event(&event, false);
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().any(|a| a.mode == Mode::Retrieval));
        assert!(actions.iter().any(|a| a.mode == Mode::Capture));
    }

    #[test]
    fn decision_prompt_triggers_retrieval() {
        let mut event = base_event(EventKind::UserPromptSubmit);
        event.prompt = Some("why did we choose postgres over mysql".to_string());
        let actions = match_event(&event, false);
        assert!(actions
            .iter()
            .any(|a| a.mode == Mode::Retrieval && a.collection == Collection::Discussions));
    }

    #[test]
    fn best_practice_prompt_triggers_rule_and_guideline_retrieval() {
        let mut event = base_event(EventKind::UserPromptSubmit);
        event.prompt = Some("what's the best way to structure this module".to_string());
        let actions = match_event(&event, false);
        let retrieval_types: Vec<_> = actions
            .iter()
            .filter(|a| a.mode == Mode::Retrieval)
            .filter_map(|a| a.type_hint)
            .collect();
        assert!(retrieval_types.contains(&MemoryType::Rule));
        assert!(retrieval_types.contains(&MemoryType::Guideline));
    }

    #[test]
    fn session_start_retrieves_handoff() {
        let event = base_event(EventKind::SessionStart);
        let actions = match_event(&event, false);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].type_hint, Some(MemoryType::AgentHandoff));
    }

    #[test]
    fn pre_tool_use_yields_no_actions() {
        let event = base_event(EventKind::PreToolUse);
        assert!(match_event(&event, false).is_empty());
    }

    fn edit_event() -> HookEvent {
        let mut event = base_event(EventKind::PostToolUse);
        event.tool_name = Some("edit".to_string());
        event.tool_input = Some(serde_json::json!({"file_path": "src/lib.rs"}));
        event
    }

    #[test]
    fn first_edit_to_a_path_retrieves_file_pattern() {
        let actions = match_event(&edit_event(), false);
        assert!(actions
            .iter()
            .any(|a| a.mode == Mode::Retrieval && a.type_hint == Some(MemoryType::FilePattern)));
    }

    #[test]
    fn edit_with_prior_file_pattern_memory_does_not_retrieve_again() {
        let actions = match_event(&edit_event(), true);
        assert!(!actions
            .iter()
            .any(|a| a.type_hint == Some(MemoryType::FilePattern)));
    }
}
