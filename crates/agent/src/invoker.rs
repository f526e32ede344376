//! Function invoker — runs the tool call a candidate proposed and writes
//! the result back into the conversation.
//!
//! Every problem with the model's input (unparseable arguments, unknown
//! tool, wrong argument shape) is turned into a function-result message
//! the model can react to. Only genuine tool failures escape as errors.

use std::sync::Arc;
use std::time::Instant;

use naturalmaps_core::error::ToolError;
use naturalmaps_core::message::{FunctionCall, Message};
use naturalmaps_core::protocol::ProtocolMarkers;
use naturalmaps_core::runlog::ToolCallRecord;
use naturalmaps_core::tool::{ResultPolicy, ToolOutcome, ToolRegistry, ToolResult};
use tracing::{debug, warn};

use crate::directives::step_directive;
use crate::state::ConversationState;

pub const TOO_LARGE_NOTICE: &str = "Overpass query returned too many results.";
pub const NO_RESULTS_SUFFIX: &str = "-> Overpass query returned no results.";

/// What happened to a proposed call.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// A result message was appended.
    Completed {
        tool_name: String,
        outcome: ToolOutcome,
        duration_ms: u64,
    },
    /// An element query already passed this iteration; nothing was run
    /// and nothing was appended.
    Skipped { tool_name: String },
}

pub struct FunctionInvoker {
    tools: Arc<ToolRegistry>,
    markers: ProtocolMarkers,
}

impl FunctionInvoker {
    pub fn new(tools: Arc<ToolRegistry>, markers: ProtocolMarkers) -> Self {
        Self { tools, markers }
    }

    /// Run `call` against the registry and record the outcome in `state`.
    ///
    /// Appends the function result followed by the step directive. Returns
    /// an error only for tool failures that are not the model's fault
    /// (`ExecutionFailed`, `Timeout`).
    pub async fn invoke(
        &self,
        call: &FunctionCall,
        state: &mut ConversationState,
    ) -> Result<Invocation, ToolError> {
        let tool = self.tools.resolve(&call.name).ok();

        if state.passed
            && tool.is_some_and(|t| matches!(t.result_policy(), ResultPolicy::ElementCollection { .. }))
        {
            debug!(tool = %call.name, "Query already passed this iteration, skipping");
            return Ok(Invocation::Skipped {
                tool_name: call.name.clone(),
            });
        }

        let start = Instant::now();

        let arguments = match serde_json::from_str::<serde_json::Value>(&call.arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Function arguments are not valid JSON");
                let content = invalid_args(&e.to_string(), &call.arguments);
                let record = ToolCallRecord {
                    tool_name: call.name.clone(),
                    raw_arguments: call.arguments.clone(),
                    parsed_arguments: None,
                    parse_error: Some(e.to_string()),
                    executed_query: None,
                    outcome: ToolOutcome::Malformed,
                    raw_response: None,
                };
                return Ok(self.finish(call, state, call.arguments.clone(), record, content, start));
            }
        };

        let Some(tool) = tool else {
            warn!(tool = %call.name, "Model called an unknown function");
            let record = ToolCallRecord {
                tool_name: call.name.clone(),
                raw_arguments: call.arguments.clone(),
                parsed_arguments: Some(arguments),
                parse_error: None,
                executed_query: None,
                outcome: ToolOutcome::NotFound,
                raw_response: None,
            };
            let content = format!("{} not found", call.name);
            return Ok(self.finish(call, state, call.arguments.clone(), record, content, start));
        };

        let key = tool
            .record_key(&arguments)
            .unwrap_or_else(|| call.arguments.clone());

        let (content, outcome, raw_response, executed_query) =
            match tool.execute(arguments.clone()).await {
                Ok(result) => {
                    let (content, outcome, passed) = classify(tool.result_policy(), &result);
                    if passed {
                        state.passed = true;
                    }
                    (content, outcome, Some(result.output), result.executed_query)
                }
                Err(e) if e.is_recoverable() => {
                    warn!(tool = %call.name, error = %e, "Tool rejected its arguments");
                    let content = invalid_args(&e.to_string(), &call.arguments);
                    (content, ToolOutcome::Malformed, None, None)
                }
                Err(e) => return Err(e),
            };

        let record = ToolCallRecord {
            tool_name: call.name.clone(),
            raw_arguments: call.arguments.clone(),
            parsed_arguments: Some(arguments),
            parse_error: None,
            executed_query,
            outcome,
            raw_response,
        };
        Ok(self.finish(call, state, key, record, content, start))
    }

    fn finish(
        &self,
        call: &FunctionCall,
        state: &mut ConversationState,
        key: String,
        record: ToolCallRecord,
        content: String,
        start: Instant,
    ) -> Invocation {
        let outcome = record.outcome;
        state.tool_call_records.insert(key, record);
        state.push(Message::function_result(&call.name, content));
        state.push(Message::system(step_directive(&self.markers, state.current_step)));

        debug!(tool = %call.name, ?outcome, "Function result appended");
        Invocation::Completed {
            tool_name: call.name.clone(),
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// The payload handed back when arguments could not be used.
fn invalid_args(error: &str, input: &str) -> String {
    serde_json::json!({ "invalid_args": error, "input": input }).to_string()
}

/// Decide what the model sees for a tool result, how the call is recorded,
/// and whether it counts as passed.
pub fn classify(policy: ResultPolicy, result: &ToolResult) -> (String, ToolOutcome, bool) {
    let ResultPolicy::ElementCollection { max_chars } = policy else {
        return (result.output.clone(), ToolOutcome::from_result(result), false);
    };

    let output = &result.output;
    let Ok(serde_json::Value::Object(document)) = serde_json::from_str(output) else {
        return (output.clone(), ToolOutcome::Malformed, false);
    };

    if output.chars().count() > max_chars {
        return (TOO_LARGE_NOTICE.to_string(), ToolOutcome::TooLarge, false);
    }

    match document.get("elements").and_then(|e| e.as_array()) {
        None => (output.clone(), ToolOutcome::Malformed, false),
        Some(elements) if elements.is_empty() => (
            format!("{output}{NO_RESULTS_SUFFIX}"),
            ToolOutcome::EmptyResult,
            false,
        ),
        Some(_) => (output.clone(), ToolOutcome::Success, true),
    }
}
