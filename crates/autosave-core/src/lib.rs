//! Debounced, single-flight auto-save engine.
//!
//! Editors hand the engine a snapshot of the entity on every change; the
//! engine coalesces bursts into single persistence calls, never runs two
//! calls for the same session at once, and keeps a status signal that any
//! number of observers can render.
//!
//! # Modules
//!
//! - [`change`] -- Decides whether a snapshot differs from the last saved one.
//! - [`session`] -- Per-editor debounce/coalesce scheduler ([`AutoSaveSession`]).
//! - [`aggregator`] -- Process-wide status shared by all sessions
//!   ([`StatusAggregator`]).
//! - [`persist`] -- The [`Persister`] seam to whatever stores entities.
//! - [`config`] -- Configuration loading from `autosave-config.yaml`.
//!
//! [`AutoSaveSession`]: session::AutoSaveSession
//! [`StatusAggregator`]: aggregator::StatusAggregator
//! [`Persister`]: persist::Persister

pub mod aggregator;
pub mod change;
pub mod config;
pub mod persist;
pub mod session;

pub use aggregator::StatusAggregator;
pub use change::should_save;
pub use config::{AutoSaveConfig, ConfigError, EngineConfig};
pub use persist::{PersistError, PersistFn, Persister, persist_fn};
pub use session::{AutoSaveSession, SaveError, SaveOutcome, SessionBuilder, Snapshot};
