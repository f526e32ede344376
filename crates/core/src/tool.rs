//! Tool trait — the abstraction over the agent's capabilities.
//!
//! Tools are what let the model reach the outside world: run an Overpass
//! query, geocode a place, measure an area.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::error::ToolError;
use crate::provider::FunctionDefinition;

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool considers the call successful
    pub success: bool,

    /// The output content sent back to the model
    pub output: String,

    /// The request as it actually reached the backend, when the tool
    /// rewrote the model's input before sending it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_query: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            executed_query: None,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            executed_query: None,
        }
    }

    pub fn with_executed_query(mut self, query: impl Into<String>) -> Self {
        self.executed_query = Some(query.into());
        self
    }
}

/// Classification of a tool call, as recorded in the run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    /// Non-empty element collection within the size limit, or any output
    /// of a pass-through tool
    Success,
    /// `elements` was present and empty
    EmptyResult,
    /// Output exceeded the size limit and was replaced with a notice
    TooLarge,
    /// Arguments or output could not be interpreted
    Malformed,
    /// No tool with the requested name
    NotFound,
}

impl ToolOutcome {
    pub fn from_result(result: &ToolResult) -> Self {
        if result.success {
            ToolOutcome::Success
        } else {
            ToolOutcome::Malformed
        }
    }
}

/// How the function invoker inspects a tool's output after the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultPolicy {
    /// Output is forwarded to the model as-is.
    #[default]
    PassThrough,

    /// Output is a JSON document with an `elements` array. Oversized
    /// documents are replaced with a notice, empty collections are flagged,
    /// and a non-empty collection marks the call as passed.
    ElementCollection { max_chars: usize },
}

/// The core Tool trait.
///
/// Each tool implements this trait and is registered in the ToolRegistry
/// that the agent loop draws on.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "overpass_query").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    ///
    /// Argument-shape problems must be reported as
    /// [`ToolError::InvalidArguments`] so the loop can hand them back to
    /// the model.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;

    /// Post-call validation applied by the function invoker.
    fn result_policy(&self) -> ResultPolicy {
        ResultPolicy::PassThrough
    }

    /// Key under which the call is recorded. Later calls with the same key
    /// replace earlier records. `None` falls back to the raw argument text.
    fn record_key(&self, _arguments: &serde_json::Value) -> Option<String> {
        None
    }

    /// Convert this tool into a FunctionDefinition for sending to the LLM.
    fn to_definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get function definitions to send to the LLM
/// 2. Resolve the tool the LLM asked for
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&dyn Tool, ToolError> {
        self.tools
            .get(name)
            .map(|t| t.as_ref())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Function definitions for the LLM, sorted by name so requests are
    /// reproducible.
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
