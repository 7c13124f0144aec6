//! Save status as seen by observers.
//!
//! [`SessionStatus`] is what a per-editor indicator renders (spinner,
//! checkmark, error banner). [`AggregateStatus`] is the process-wide view
//! behind a global "saving..." badge, and [`SaveEvent`] is the stream of
//! individual transitions for observers that need every one of them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::SessionId;

// ---------------------------------------------------------------------------
// Per-session status
// ---------------------------------------------------------------------------

/// Lifecycle state of one session's save indicator.
///
/// Transitions: `Idle -> Saving -> Saved -> Idle` and
/// `Saving -> Error -> Idle`. `Saved` and `Error` revert to `Idle` on
/// their own after a display window.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SaveState {
    /// Nothing to show.
    #[default]
    Idle,
    /// A persistence call is outstanding.
    Saving,
    /// The last persistence call succeeded.
    Saved,
    /// The last persistence call failed.
    Error,
}

/// Observable status of one editing session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SessionStatus {
    /// Current indicator state.
    pub state: SaveState,
    /// Wall-clock time of the most recent successful save.
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Message of the most recent failure, cleared with the error display.
    pub last_error: Option<String>,
    /// Whether the latest snapshot differs from the last saved one.
    pub has_unsaved_changes: bool,
}

impl SessionStatus {
    /// Whether a persistence call is outstanding.
    pub fn is_saving(&self) -> bool {
        self.state == SaveState::Saving
    }
}

// ---------------------------------------------------------------------------
// Aggregate status
// ---------------------------------------------------------------------------

/// Process-wide save status reduced over every session.
///
/// `saving_sessions` is an explicit set rather than a flag, so one session
/// finishing never hides another that is still saving.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AggregateStatus {
    /// Sessions with a persistence call outstanding.
    pub saving_sessions: BTreeSet<SessionId>,
    /// Most recent successful save across all sessions.
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Number of successful saves since the aggregator was created.
    pub save_count: u64,
}

impl AggregateStatus {
    /// Whether any session is currently saving.
    pub fn is_saving(&self) -> bool {
        !self.saving_sessions.is_empty()
    }

    /// Number of sessions currently saving.
    pub fn active_count(&self) -> usize {
        self.saving_sessions.len()
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What happened to a session's save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SaveEventKind {
    /// A persistence call was dispatched.
    Started,
    /// A persistence call succeeded.
    Saved {
        /// When the save completed.
        at: DateTime<Utc>,
    },
    /// A persistence call finished without success.
    Ended,
}

/// A single save transition reported by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SaveEvent {
    /// The reporting session.
    pub session: SessionId,
    /// The transition.
    #[serde(flatten)]
    #[ts(flatten)]
    pub kind: SaveEventKind,
}
