//! Shared test helpers for agent tests.

use async_trait::async_trait;
use naturalmaps_core::error::{ProviderError, RunLogError, ToolError};
use naturalmaps_core::message::Message;
use naturalmaps_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use naturalmaps_core::runlog::{RunEntries, RunLog, RunSnapshot};
use naturalmaps_core::tool::{ResultPolicy, Tool, ToolResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// keeps a copy of the request. Panics if more calls are made than
/// responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One batch of candidates per entry.
    pub fn batches(batches: Vec<Vec<Message>>) -> Self {
        Self::new(batches.into_iter().map(make_response).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();

        if index >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                index,
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[index].clone())
    }
}

/// A provider whose every call fails.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Wrap candidates in a provider response.
pub fn make_response(choices: Vec<Message>) -> ProviderResponse {
    ProviderResponse {
        choices,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// An assistant candidate calling `overpass_query`.
pub fn overpass_call(content: Option<&str>, prompt: &str) -> Message {
    Message::function_call(
        content.map(str::to_string),
        "overpass_query",
        serde_json::json!({
            "human_prompt": prompt,
            "generated_query": "[out:json];node[\"leisure\"=\"park\"];out;"
        })
        .to_string(),
    )
}

/// An Overpass stand-in that replays canned documents, repeating the last
/// one once exhausted.
pub struct StubElementTool {
    outputs: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl StubElementTool {
    pub fn new(outputs: Vec<&str>) -> Self {
        Self {
            outputs: outputs.into_iter().map(str::to_string).collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter, readable after the tool moved into a registry.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for StubElementTool {
    fn name(&self) -> &str {
        "overpass_query"
    }

    fn description(&self) -> &str {
        "Canned Overpass results"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "human_prompt": { "type": "string" },
                "generated_query": { "type": "string" }
            },
            "required": ["human_prompt", "generated_query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let Some(query) = arguments["generated_query"].as_str() else {
            return Err(ToolError::InvalidArguments("missing 'generated_query'".into()));
        };
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let output = self
            .outputs
            .get(n)
            .or_else(|| self.outputs.last())
            .cloned()
            .unwrap_or_default();
        let executed: String = query.chars().filter(|c| *c != '\n').collect();
        Ok(ToolResult::ok(output).with_executed_query(executed))
    }

    fn result_policy(&self) -> ResultPolicy {
        ResultPolicy::ElementCollection { max_chars: 4096 }
    }

    fn record_key(&self, arguments: &serde_json::Value) -> Option<String> {
        arguments["human_prompt"].as_str().map(str::to_string)
    }
}

/// A pass-through tool that insists on a `places` argument.
pub struct StrictTool;

#[async_trait]
impl Tool for StrictTool {
    fn name(&self) -> &str {
        "get_place_info"
    }

    fn description(&self) -> &str {
        "Area of a place"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "places": { "type": "string" } },
            "required": ["places"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let places = arguments["places"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing field `places`".into()))?;
        Ok(ToolResult::ok(format!("{{\"area\": {{\"{places}\": 1000.0}}}}")))
    }
}

/// A tool whose backend is down.
pub struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "broken".into(),
            reason: "backend unavailable".into(),
        })
    }
}

/// A run log that cannot write.
pub struct FailingRunLog {
    attempts: AtomicUsize,
}

impl FailingRunLog {
    pub fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunLog for FailingRunLog {
    fn name(&self) -> &str {
        "failing"
    }

    async fn persist(
        &self,
        _run_id: &str,
        _iteration_label: &str,
        _snapshot: &RunSnapshot,
    ) -> Result<(), RunLogError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(RunLogError::Storage("disk full".into()))
    }

    async fn load(&self, _run_id: &str) -> Result<Option<RunEntries>, RunLogError> {
        Ok(None)
    }

    async fn run_ids(&self) -> Result<Vec<String>, RunLogError> {
        Ok(vec![])
    }
}
