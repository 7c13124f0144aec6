//! Edit scripts: JSON lines describing what editors do and when.
//!
//! Each non-empty line that does not start with `#` is one [`ScriptStep`]:
//!
//! ```text
//! {"after_ms": 0,   "entity": "parish-12", "action": "open", "baseline": {"name": "St Mary"}}
//! {"after_ms": 150, "entity": "parish-12", "action": "update", "snapshot": {"name": "St Marys"}}
//! {"after_ms": 0,   "entity": "parish-12", "action": "force_save"}
//! {"after_ms": 0,   "entity": "parish-12", "action": "discard"}
//! ```
//!
//! `after_ms` is a delay relative to the previous step.

use serde::Deserialize;
use serde_json::Value;

/// Errors that can occur while parsing a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// A line is not a valid step.
    #[error("line {line}: {source}")]
    Parse {
        /// One-based line number.
        line: usize,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// One scripted editor action.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptStep {
    /// Delay before this step, relative to the previous one.
    #[serde(default)]
    pub after_ms: u64,
    /// Entity the step applies to; one session per entity.
    #[serde(default)]
    pub entity: String,
    /// What the editor does.
    #[serde(flatten)]
    pub action: StepAction,
}

/// Editor actions a script can perform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    /// Open an editor, optionally with the entity as loaded.
    Open {
        /// Snapshot treated as already saved.
        #[serde(default)]
        baseline: Option<Value>,
        /// Label used in logs; defaults to the entity name.
        #[serde(default)]
        label: Option<String>,
    },
    /// Hand the session a new snapshot.
    Update {
        /// The new entity state.
        snapshot: Value,
        /// Make the next write for this entity fail.
        #[serde(default)]
        fail: bool,
    },
    /// Save immediately and wait for the outcome.
    ForceSave,
    /// Toggle auto-save for the entity.
    SetEnabled {
        /// New value of the enabled flag.
        enabled: bool,
    },
    /// Close the editor.
    Discard,
    /// Do nothing; only the delay applies.
    Wait,
}

/// Parse a JSON-lines script.
///
/// # Errors
///
/// Returns [`ScriptError::Parse`] naming the first line that is not a
/// valid step.
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| ScriptError::Parse {
                line: index.saturating_add(1),
                source,
            })
        })
        .collect()
}
