//! Shared type definitions for the Autosave engine.
//!
//! Everything an observer needs to render a save indicator lives here, so
//! the admin UI can consume the same shapes via `ts-rs` generated
//! `TypeScript` bindings without depending on the engine itself.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for editing sessions
//! - [`status`] -- Per-session and aggregate save status, plus save events

pub mod ids;
pub mod status;

pub use ids::SessionId;
pub use status::{AggregateStatus, SaveEvent, SaveEventKind, SaveState, SessionStatus};

#[cfg(test)]
mod tests {
    //! Binding generation for the admin UI.

    #[test]
    fn export_bindings() {
        // Files are written to `bindings/` relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::SessionId::export_all();
        let _ = crate::status::SaveState::export_all();
        let _ = crate::status::SessionStatus::export_all();
        let _ = crate::status::AggregateStatus::export_all();
        let _ = crate::status::SaveEvent::export_all();
        let _ = crate::status::SaveEventKind::export_all();
    }
}
