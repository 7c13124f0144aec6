//! Error types for the runner binary.
//!
//! [`RunnerError`] is the top-level error type that wraps every failure
//! mode during startup and script replay.

use crate::script::ScriptError;

/// Top-level error for the runner binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The command line was not understood.
    #[error("usage: {message}")]
    Usage {
        /// What was wrong and how to invoke the runner.
        message: String,
    },

    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: autosave_core::ConfigError,
    },

    /// The edit script could not be read.
    #[error("failed to read script: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The edit script could not be parsed.
    #[error("script error: {source}")]
    Script {
        /// The underlying script error.
        #[from]
        source: ScriptError,
    },

    /// The final status could not be rendered.
    #[error("failed to render status: {source}")]
    Render {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}
