//! Change detection between a candidate snapshot and the last saved one.
//!
//! This is what keeps a closed debounce window from producing a redundant
//! persistence call when a field was edited and then reverted.
//!
//! Equality is whatever the snapshot type says it is. For dynamic snapshots
//! use [`serde_json::Value`]: object comparison ignores key order while
//! array comparison does not.

/// Decide whether `candidate` needs persisting.
///
/// Returns `true` if nothing has been saved yet or if the candidate is not
/// equal to the last saved snapshot.
pub fn should_save<S: PartialEq>(candidate: &S, last_saved: Option<&S>) -> bool {
    last_saved.is_none_or(|saved| saved != candidate)
}
