//! File-backed persistence: one pretty-printed JSON file per entity.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use autosave_core::{PersistError, Persister};
use serde_json::Value;

/// Writes snapshots of one entity to `<dir>/<entity>.json`.
///
/// A write can be made to fail on demand with [`fail_next`], which is how
/// scripts exercise the error path.
///
/// [`fail_next`]: Self::fail_next
#[derive(Debug, Clone)]
pub struct FilePersister {
    path: PathBuf,
    fail_next: Arc<AtomicBool>,
}

impl FilePersister {
    /// Create a persister for `entity` below `output_dir`.
    pub fn new(output_dir: &Path, entity: &str) -> Self {
        Self {
            path: output_dir.join(format!("{}.json", file_stem(entity))),
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make the next write fail without touching the file.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::Release);
    }
}

impl Persister<Value> for FilePersister {
    fn persist(&self, snapshot: Value) -> impl Future<Output = Result<Value, PersistError>> + Send {
        let path = self.path.clone();
        let fail = self.fail_next.swap(false, Ordering::AcqRel);
        async move {
            if fail {
                return Err(PersistError::new(format!(
                    "simulated write failure for {}",
                    path.display()
                )));
            }
            let bytes =
                serde_json::to_vec_pretty(&snapshot).map_err(|e| PersistError::from_display(&e))?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| PersistError::from_display(&e))?;
            }
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| PersistError::from_display(&e))?;
            Ok(snapshot)
        }
    }
}

/// Entity names become file names; anything outside `[A-Za-z0-9_-]` is
/// replaced so names like `parish:12/risks` stay inside the output directory.
fn file_stem(entity: &str) -> String {
    let stem: String = entity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "entity".to_owned()
    } else {
        stem
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("autosave-storage-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn entity_names_are_sanitized() {
        assert_eq!(file_stem("parish-12"), "parish-12");
        assert_eq!(file_stem("parish:12/risks"), "parish_12_risks");
        assert_eq!(file_stem("../etc"), "___etc");
        assert_eq!(file_stem(""), "entity");
    }

    #[tokio::test]
    async fn writes_pretty_json() {
        let dir = scratch_dir();
        let persister = FilePersister::new(&dir, "strategy:4");
        let snapshot = json!({"name": "Roof repair", "cost": 1200});

        let stored = persister.persist(snapshot.clone()).await.unwrap();
        assert_eq!(stored, snapshot);

        let written = tokio::fs::read_to_string(persister.path()).await.unwrap();
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, snapshot);
        assert!(written.contains('\n'));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn fail_next_fails_once() {
        let dir = scratch_dir();
        let persister = FilePersister::new(&dir, "cost-item-9");
        persister.fail_next();

        let err = persister.persist(json!({"v": 1})).await.unwrap_err();
        assert!(err.message.contains("simulated write failure"));
        assert!(!persister.path().exists());

        persister.persist(json!({"v": 2})).await.unwrap();
        assert!(persister.path().exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
