//! The persistence seam between the engine and the outside world.
//!
//! The engine never knows how an entity is stored. Callers hand it a
//! [`Persister`] (a network client, a database writer, a test double) and
//! the scheduler invokes it at most once at a time per session.
//!
//! Closures can be adapted with [`persist_fn`].

use std::fmt;
use std::future::Future;

/// A failed persistence call.
///
/// Only the message survives: it is what the error indicator shows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PersistError {
    /// Human-readable failure description.
    pub message: String,
}

impl PersistError {
    /// Create an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Create an error from anything displayable.
    pub fn from_display(err: &impl fmt::Display) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// Writes a snapshot somewhere durable.
///
/// The returned value is the entity as stored, which may carry fields the
/// store assigned. The engine imposes no timeout; an implementation that
/// needs one must apply it itself.
pub trait Persister<S>: Send + Sync + 'static {
    /// Persist `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] when the write was rejected or failed.
    fn persist(&self, snapshot: S) -> impl Future<Output = Result<S, PersistError>> + Send;
}

/// A [`Persister`] backed by an async closure. Built by [`persist_fn`].
#[derive(Debug, Clone, Copy)]
pub struct PersistFn<F> {
    f: F,
}

/// Adapt a closure returning a future into a [`Persister`].
pub const fn persist_fn<F>(f: F) -> PersistFn<F> {
    PersistFn { f }
}

impl<S, F, Fut> Persister<S> for PersistFn<F>
where
    F: Fn(S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S, PersistError>> + Send,
{
    fn persist(&self, snapshot: S) -> impl Future<Output = Result<S, PersistError>> + Send {
        (self.f)(snapshot)
    }
}
