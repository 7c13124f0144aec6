//! Autosave runner binary.
//!
//! Replays a scripted stream of editor actions through the auto-save
//! engine, persisting every entity as a JSON file. It is the quickest way
//! to watch debouncing, coalescing and the global status signal at work
//! outside the admin UI.
//!
//! # Usage
//!
//! ```text
//! autosave-runner <script.jsonl> [autosave-config.yaml]
//! ```
//!
//! # Startup Sequence
//!
//! 1. Load configuration (explicit path, `autosave-config.yaml`, or defaults)
//! 2. Initialize structured logging (tracing)
//! 3. Parse the edit script
//! 4. Start the aggregate status monitor
//! 5. Replay the script, flushing every open session at the end
//! 6. Print the final aggregate status as JSON

mod error;
mod replay;
mod script;
mod storage;

use std::path::{Path, PathBuf};

use autosave_core::{EngineConfig, StatusAggregator};
use autosave_types::AggregateStatus;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::RunnerError;
use crate::replay::Replay;

/// Configuration file picked up from the working directory when present.
const DEFAULT_CONFIG_PATH: &str = "autosave-config.yaml";

/// Application entry point for the runner.
///
/// # Errors
///
/// Returns an error if configuration, the script, or rendering the final
/// status fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run().await?;
    Ok(())
}

async fn run() -> Result<(), RunnerError> {
    let mut args = std::env::args().skip(1);
    let script_path = args.next().map(PathBuf::from).ok_or_else(|| RunnerError::Usage {
        message: "autosave-runner <script.jsonl> [autosave-config.yaml]".to_owned(),
    })?;

    // 1. Load configuration.
    let config = load_config(args.next().as_deref().map(Path::new))?;

    // 2. Initialize structured logging. Stdout is reserved for the result.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        debounce_ms = config.autosave.debounce_ms,
        saved_display_ms = config.autosave.saved_display_ms,
        error_display_ms = config.autosave.error_display_ms,
        enabled = config.autosave.enabled,
        output_dir = %config.storage.output_dir.display(),
        "Configuration loaded"
    );

    // 3. Parse the edit script.
    let text = tokio::fs::read_to_string(&script_path).await?;
    let steps = script::parse_script(&text)?;
    info!(path = %script_path.display(), steps = steps.len(), "Script loaded");

    // 4. Start the aggregate status monitor.
    let aggregator = StatusAggregator::new();
    let monitor = spawn_status_monitor(&aggregator);

    // 5. Replay.
    let summary = Replay::new(config, aggregator.clone()).run(steps).await;
    monitor.abort();
    info!(
        steps = summary.steps,
        sessions_opened = summary.sessions_opened,
        forced_saves = summary.forced_saves,
        failed_forced_saves = summary.failed_forced_saves,
        "Replay finished"
    );

    // 6. Print the final aggregate status.
    let status = serde_json::to_string_pretty(&aggregator.snapshot())?;
    println!("{status}");
    Ok(())
}

/// Load configuration from `path`, the default file, or built-in defaults.
fn load_config(path: Option<&Path>) -> Result<EngineConfig, RunnerError> {
    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    let config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None if default_path.exists() => EngineConfig::from_file(default_path)?,
        None => EngineConfig::parse("")?,
    };
    Ok(config)
}

/// Log every change of the aggregate status until aborted.
fn spawn_status_monitor(aggregator: &StatusAggregator) -> JoinHandle<()> {
    let mut status = aggregator.subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            log_status(&current);
        }
    })
}

fn log_status(status: &AggregateStatus) {
    info!(
        saving = status.is_saving(),
        active_sessions = status.active_count(),
        save_count = status.save_count,
        last_saved_at = ?status.last_saved_at,
        "Aggregate status"
    );
}
