//! In-memory run log — useful for testing and throwaway runs.

use async_trait::async_trait;
use naturalmaps_core::error::RunLogError;
use naturalmaps_core::runlog::{RunEntries, RunLog, RunSnapshot};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps the same `run_id -> label -> snapshot` structure as the JSON file
/// backend, without touching the disk.
#[derive(Clone, Default)]
pub struct InMemoryRunLog {
    runs: Arc<RwLock<BTreeMap<String, RunEntries>>>,
}

impl InMemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunLog for InMemoryRunLog {
    fn name(&self) -> &str { "in_memory" }

    async fn persist(
        &self,
        run_id: &str,
        iteration_label: &str,
        snapshot: &RunSnapshot,
    ) -> Result<(), RunLogError> {
        self.runs
            .write()
            .await
            .entry(run_id.to_string())
            .or_default()
            .insert(iteration_label.to_string(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunEntries>, RunLogError> {
        Ok(self.runs.read().await.get(run_id).cloned())
    }

    async fn run_ids(&self) -> Result<Vec<String>, RunLogError> {
        Ok(self.runs.read().await.keys().cloned().collect())
    }
}
