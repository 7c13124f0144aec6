//! Process-wide save status shared by every session.
//!
//! Sessions report three transitions (started, saved, ended) and the
//! aggregator reduces them into one [`AggregateStatus`] for global
//! indicators. Observers subscribe instead of polling shared fields:
//!
//! - [`StatusAggregator::subscribe`] yields the reduced status through a
//!   `watch` channel (latest value wins, cheap for renderers).
//! - [`StatusAggregator::events`] yields every [`SaveEvent`] through a
//!   `broadcast` channel.
//!
//! Saving is tracked as a set of session ids, so overlapping sessions never
//! clear each other's saving flag, and `last_saved_at` only moves forward.

use std::sync::Arc;

use autosave_types::{AggregateStatus, SaveEvent, SaveEventKind, SessionId};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::trace;

/// Capacity of the save event broadcast channel.
///
/// A subscriber that falls behind by more than this many events receives
/// [`broadcast::error::RecvError::Lagged`] and skips to the newest event.
const EVENT_CAPACITY: usize = 256;

/// Cloneable handle to the shared status aggregator.
///
/// Create one per process and hand clones to every session.
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    status: watch::Sender<AggregateStatus>,
    events: broadcast::Sender<SaveEvent>,
}

impl StatusAggregator {
    /// Create an aggregator with nothing saving and no saves recorded.
    pub fn new() -> Self {
        let (status, _) = watch::channel(AggregateStatus::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner { status, events }),
        }
    }

    /// Record that `session` dispatched a persistence call.
    pub fn report_saving_started(&self, session: SessionId) {
        self.inner.status.send_modify(|status| {
            status.saving_sessions.insert(session);
        });
        self.publish(SaveEvent {
            session,
            kind: SaveEventKind::Started,
        });
    }

    /// Record that `session` saved successfully at `at`.
    pub fn report_saved(&self, session: SessionId, at: DateTime<Utc>) {
        self.inner.status.send_modify(|status| {
            status.saving_sessions.remove(&session);
            status.last_saved_at = Some(status.last_saved_at.map_or(at, |prev| prev.max(at)));
            status.save_count = status.save_count.saturating_add(1);
        });
        self.publish(SaveEvent {
            session,
            kind: SaveEventKind::Saved { at },
        });
    }

    /// Record that `session` finished saving without success.
    pub fn report_saving_ended(&self, session: SessionId) {
        self.inner.status.send_modify(|status| {
            status.saving_sessions.remove(&session);
        });
        self.publish(SaveEvent {
            session,
            kind: SaveEventKind::Ended,
        });
    }

    /// Return a copy of the current aggregate status.
    pub fn snapshot(&self) -> AggregateStatus {
        self.inner.status.borrow().clone()
    }

    /// Whether any session is currently saving.
    pub fn is_saving(&self) -> bool {
        self.inner.status.borrow().is_saving()
    }

    /// Subscribe to the reduced status.
    pub fn subscribe(&self) -> watch::Receiver<AggregateStatus> {
        self.inner.status.subscribe()
    }

    /// Subscribe to individual save events.
    pub fn events(&self) -> broadcast::Receiver<SaveEvent> {
        self.inner.events.subscribe()
    }

    fn publish(&self, event: SaveEvent) {
        // send fails only when nobody is subscribed, which is normal.
        let receivers = self.inner.events.send(event).unwrap_or(0);
        trace!(session = %event.session, kind = ?event.kind, receivers, "save event published");
    }
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn starts_idle() {
        let aggregator = StatusAggregator::new();
        let status = aggregator.snapshot();
        assert!(!status.is_saving());
        assert_eq!(status.save_count, 0);
        assert!(status.last_saved_at.is_none());
    }

    #[test]
    fn overlapping_sessions_keep_saving_flag() {
        let aggregator = StatusAggregator::new();
        let first = SessionId::new();
        let second = SessionId::new();

        aggregator.report_saving_started(first);
        aggregator.report_saving_started(second);
        assert_eq!(aggregator.snapshot().active_count(), 2);

        aggregator.report_saved(first, Utc::now());
        assert!(aggregator.is_saving());

        aggregator.report_saving_ended(second);
        assert!(!aggregator.is_saving());
        assert_eq!(aggregator.snapshot().save_count, 1);
    }

    #[test]
    fn repeated_reports_do_not_underflow() {
        let aggregator = StatusAggregator::new();
        let session = SessionId::new();

        aggregator.report_saving_started(session);
        aggregator.report_saving_started(session);
        assert_eq!(aggregator.snapshot().active_count(), 1);

        aggregator.report_saving_ended(session);
        aggregator.report_saving_ended(session);
        assert!(!aggregator.is_saving());
    }

    #[test]
    fn last_saved_at_only_moves_forward() {
        let aggregator = StatusAggregator::new();
        let later = Utc::now();
        let earlier = later.checked_sub_signed(TimeDelta::seconds(10)).unwrap();

        aggregator.report_saved(SessionId::new(), later);
        aggregator.report_saved(SessionId::new(), earlier);

        let status = aggregator.snapshot();
        assert_eq!(status.last_saved_at, Some(later));
        assert_eq!(status.save_count, 2);
    }

    #[test]
    fn clones_share_state() {
        let aggregator = StatusAggregator::new();
        let clone = aggregator.clone();
        clone.report_saving_started(SessionId::new());
        assert!(aggregator.is_saving());
    }

    #[tokio::test]
    async fn watch_subscribers_see_changes() {
        let aggregator = StatusAggregator::new();
        let mut rx = aggregator.subscribe();
        let session = SessionId::new();

        aggregator.report_saving_started(session);
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_saving());

        aggregator.report_saved(session, Utc::now());
        rx.changed().await.unwrap();
        let status = rx.borrow_and_update().clone();
        assert!(!status.is_saving());
        assert_eq!(status.save_count, 1);
    }

    #[tokio::test]
    async fn event_stream_carries_every_transition() {
        let aggregator = StatusAggregator::new();
        let mut events = aggregator.events();
        let session = SessionId::new();
        let at = Utc::now();

        aggregator.report_saving_started(session);
        aggregator.report_saved(session, at);
        aggregator.report_saving_started(session);
        aggregator.report_saving_ended(session);

        let kinds: Vec<SaveEventKind> = [
            events.recv().await.unwrap(),
            events.recv().await.unwrap(),
            events.recv().await.unwrap(),
            events.recv().await.unwrap(),
        ]
        .iter()
        .map(|event| event.kind)
        .collect();
        assert_eq!(
            kinds,
            vec![
                SaveEventKind::Started,
                SaveEventKind::Saved { at },
                SaveEventKind::Started,
                SaveEventKind::Ended,
            ]
        );
    }
}
