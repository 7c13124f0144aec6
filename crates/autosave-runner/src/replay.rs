//! Script replay: drives one auto-save session per entity.
//!
//! Sessions are opened lazily the first time a step names an entity (or
//! explicitly with an `open` step to supply a baseline). When the script
//! ends, every session still open is force-saved and discarded, the way an
//! admin screen flushes its editors on close.

use std::collections::BTreeMap;
use std::time::Duration;

use autosave_core::{AutoSaveSession, EngineConfig, SaveError, SaveOutcome, StatusAggregator};
use serde_json::Value;
use tracing::{info, warn};

use crate::script::{ScriptStep, StepAction};
use crate::storage::FilePersister;

/// Counters describing what a replay did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Steps applied.
    pub steps: usize,
    /// Sessions opened, explicitly or lazily.
    pub sessions_opened: usize,
    /// Force-saves requested, including the final flush.
    pub forced_saves: usize,
    /// Force-saves that returned an error.
    pub failed_forced_saves: usize,
}

struct OpenSession {
    session: AutoSaveSession<Value>,
    persister: FilePersister,
}

/// Replays scripted steps against file-backed sessions.
pub struct Replay {
    config: EngineConfig,
    aggregator: StatusAggregator,
    sessions: BTreeMap<String, OpenSession>,
    summary: ReplaySummary,
}

impl Replay {
    /// Create a replay that reports into `aggregator`.
    pub const fn new(config: EngineConfig, aggregator: StatusAggregator) -> Self {
        Self {
            config,
            aggregator,
            sessions: BTreeMap::new(),
            summary: ReplaySummary {
                steps: 0,
                sessions_opened: 0,
                forced_saves: 0,
                failed_forced_saves: 0,
            },
        }
    }

    /// Apply every step in order, then flush and close all sessions.
    pub async fn run(mut self, steps: Vec<ScriptStep>) -> ReplaySummary {
        for step in steps {
            if step.after_ms > 0 {
                tokio::time::sleep(Duration::from_millis(step.after_ms)).await;
            }
            self.apply(step).await;
            self.summary.steps = self.summary.steps.saturating_add(1);
        }
        self.close_all().await;
        self.summary
    }

    async fn apply(&mut self, step: ScriptStep) {
        let entity = step.entity;
        match step.action {
            StepAction::Open { baseline, label } => {
                if self.sessions.contains_key(&entity) {
                    warn!(entity = %entity, "Session already open, open step ignored");
                } else {
                    self.open(&entity, baseline, label);
                }
            }
            StepAction::Update { snapshot, fail } => {
                let open = self.session(&entity);
                if fail {
                    open.persister.fail_next();
                }
                open.session.update(snapshot);
            }
            StepAction::ForceSave => self.force_save(&entity).await,
            StepAction::SetEnabled { enabled } => self.session(&entity).session.set_enabled(enabled),
            StepAction::Discard => match self.sessions.remove(&entity) {
                Some(open) => {
                    info!(entity = %entity, session = %open.session.id(), "Session discarded");
                    open.session.discard();
                }
                None => warn!(entity = %entity, "Discard for unknown session ignored"),
            },
            StepAction::Wait => {}
        }
    }

    fn open(&mut self, entity: &str, baseline: Option<Value>, label: Option<String>) {
        let open = open_session(&self.config, &self.aggregator, entity, baseline, label);
        self.sessions.insert(entity.to_owned(), open);
        self.summary.sessions_opened = self.summary.sessions_opened.saturating_add(1);
    }

    /// Session for `entity`, opened with defaults on first use.
    fn session(&mut self, entity: &str) -> &OpenSession {
        let Self {
            config,
            aggregator,
            sessions,
            summary,
        } = self;
        sessions.entry(entity.to_owned()).or_insert_with(|| {
            summary.sessions_opened = summary.sessions_opened.saturating_add(1);
            open_session(config, aggregator, entity, None, None)
        })
    }

    async fn force_save(&mut self, entity: &str) {
        let result = self.session(entity).session.force_save().await;
        self.record_force_save(entity, &result);
    }

    fn record_force_save(&mut self, entity: &str, result: &Result<SaveOutcome<Value>, SaveError>) {
        self.summary.forced_saves = self.summary.forced_saves.saturating_add(1);
        match result {
            Ok(SaveOutcome::Saved { saved_at, .. }) => {
                info!(entity = %entity, %saved_at, "Force-save completed");
            }
            Ok(SaveOutcome::Unchanged) => info!(entity = %entity, "Force-save found nothing to save"),
            Err(err) => {
                self.summary.failed_forced_saves = self.summary.failed_forced_saves.saturating_add(1);
                warn!(entity = %entity, error = %err, "Force-save failed");
            }
        }
    }

    async fn close_all(&mut self) {
        let sessions = std::mem::take(&mut self.sessions);
        for (entity, open) in sessions {
            let result = open.session.force_save().await;
            self.record_force_save(&entity, &result);
            open.session.discard();
        }
    }
}

fn open_session(
    config: &EngineConfig,
    aggregator: &StatusAggregator,
    entity: &str,
    baseline: Option<Value>,
    label: Option<String>,
) -> OpenSession {
    let persister = FilePersister::new(&config.storage.output_dir, entity);
    let mut builder = AutoSaveSession::builder(persister.clone(), aggregator.clone())
        .config(config.autosave)
        .label(label.unwrap_or_else(|| entity.to_owned()));
    if let Some(baseline) = baseline {
        builder = builder.baseline(baseline);
    }
    let session = builder.spawn();
    info!(
        entity = %entity,
        session = %session.id(),
        path = %persister.path().display(),
        "Session opened"
    );
    OpenSession { session, persister }
}
