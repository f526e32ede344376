//! Run log trait — the persisted audit trail of every run.
//!
//! After an iteration (and always once at loop exit) the agent loop hands a
//! [`RunSnapshot`] to a [`RunLog`]. Stores are keyed first by run id, then
//! by iteration label; writing the same pair twice keeps the later snapshot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::error::RunLogError;
use crate::message::MessageLog;
use crate::tool::ToolOutcome;

/// One tool invocation as seen by the function invoker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,

    /// Argument text exactly as the model produced it
    pub raw_arguments: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_arguments: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,

    /// What the tool actually sent after cleaning the arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_query: Option<String>,

    pub outcome: ToolOutcome,

    /// Tool output before any rewriting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// Tool-call records keyed by a stable identifier (last attempt wins).
pub type ToolCallRecords = BTreeMap<String, ToolCallRecord>;

/// Everything persisted for one iteration label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub model: String,
    pub temperature: f32,
    pub valid_messages: MessageLog,
    pub invalid_messages: Vec<String>,
    #[serde(default)]
    pub tool_call_records: ToolCallRecords,
    #[serde(default)]
    pub plan: Vec<String>,
    pub current_step: u32,
    #[serde(default)]
    pub terminal: bool,
}

/// Snapshots of a single run, keyed by iteration label.
pub type RunEntries = BTreeMap<String, RunSnapshot>;

/// Durable storage for run snapshots.
#[async_trait]
pub trait RunLog: Send + Sync {
    /// The name of this backend (e.g., "json_file", "in_memory").
    fn name(&self) -> &str;

    /// Store `snapshot` under `run_id` / `iteration_label`, replacing any
    /// snapshot already stored under the same pair.
    async fn persist(
        &self,
        run_id: &str,
        iteration_label: &str,
        snapshot: &RunSnapshot,
    ) -> Result<(), RunLogError>;

    /// All snapshots of a run, or `None` if the run was never logged.
    async fn load(&self, run_id: &str) -> Result<Option<RunEntries>, RunLogError>;

    /// Ids of every logged run, sorted.
    async fn run_ids(&self) -> Result<Vec<String>, RunLogError>;
}
