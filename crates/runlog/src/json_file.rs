//! JSON file run log — one document holding every run.
//!
//! Layout: `{ run_id: { iteration_label: { "log": snapshot } } }`.
//!
//! Every persist reads the whole document, merges the new snapshot and
//! writes it back. Cost grows with history size; runs are small and a
//! single readable file is what the `runs` command and humans inspect.
//!
//! Storage location: `~/naturalmaps_logs/runs.json`

use async_trait::async_trait;
use naturalmaps_core::error::RunLogError;
use naturalmaps_core::runlog::{RunEntries, RunLog, RunSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// The wrapper stored under each iteration label.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggedIteration {
    log: RunSnapshot,
}

type Document = BTreeMap<String, BTreeMap<String, LoggedIteration>>;

/// A file-backed run log using a single JSON document.
pub struct JsonFileRunLog {
    path: PathBuf,
    /// Serialises read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonFileRunLog {
    /// Create a run log at the given path. Nothing touches the disk until
    /// the first persist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document. A missing file is an empty document; an
    /// unreadable one is reported so it is never overwritten.
    async fn read_document(&self) -> Result<Document, RunLogError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => {
                return Err(RunLogError::Storage(format!(
                    "Failed to read run log {}: {e}",
                    self.path.display()
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(Document::new());
        }

        serde_json::from_str(&content).map_err(|e| RunLogError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn write_document(&self, document: &Document) -> Result<(), RunLogError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    RunLogError::Storage(format!("Failed to create log directory: {e}"))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(document)
            .map_err(|e| RunLogError::Storage(format!("Failed to serialize run log: {e}")))?;

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| RunLogError::Storage(format!("Failed to write run log: {e}")))
    }
}

#[async_trait]
impl RunLog for JsonFileRunLog {
    fn name(&self) -> &str {
        "json_file"
    }

    async fn persist(
        &self,
        run_id: &str,
        iteration_label: &str,
        snapshot: &RunSnapshot,
    ) -> Result<(), RunLogError> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        document.entry(run_id.to_string()).or_default().insert(
            iteration_label.to_string(),
            LoggedIteration {
                log: snapshot.clone(),
            },
        );
        self.write_document(&document).await?;

        debug!(path = %self.path.display(), run_id, iteration_label, "Run log persisted");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunEntries>, RunLogError> {
        let mut document = self.read_document().await?;
        Ok(document.remove(run_id).map(|entries| {
            entries
                .into_iter()
                .map(|(label, logged)| (label, logged.log))
                .collect()
        }))
    }

    async fn run_ids(&self) -> Result<Vec<String>, RunLogError> {
        Ok(self.read_document().await?.into_keys().collect())
    }
}
