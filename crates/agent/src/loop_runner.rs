//! The agent loop — plan, call tools, follow the steps, stop.
//!
//! One run is a small state machine:
//!
//! ```text
//! PlanningSent ─▶ AwaitingModel ─▶ Routing ─▶ AwaitingModel ─▶ …
//!                      │
//!                      ├─▶ Done              (terminal sentinel seen)
//!                      └─▶ BudgetExhausted   (no iterations left)
//! ```
//!
//! Every candidate of a batch is validated, appended and routed before the
//! next one is looked at, so a later candidate sees what an earlier one did
//! (in particular a query that already passed).

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use naturalmaps_config::AppConfig;
use naturalmaps_core::error::{Error, RunLogError};
use naturalmaps_core::event::{DomainEvent, EventBus};
use naturalmaps_core::message::{Message, MessageLog};
use naturalmaps_core::protocol::ProtocolMarkers;
use naturalmaps_core::provider::{Provider, ProviderRequest, ProviderResponse};
use naturalmaps_core::runlog::RunLog;
use naturalmaps_core::tool::ToolRegistry;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::directives::planning_directive;
use crate::invoker::{FunctionInvoker, Invocation};
use crate::plan::PlanTracker;
use crate::state::ConversationState;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The model emitted the terminal sentinel
    Completed,
    /// The iteration budget ran out first; the answer may be partial
    OutOfIterations,
}

/// The result of one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    /// Iterations actually consumed
    pub iterations: u32,
    /// Latest assistant content of this run, sentinel removed
    pub answer: Option<String>,
    pub state: ConversationState,
    /// Set when the final run log write failed
    pub log_error: Option<RunLogError>,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

enum Phase {
    PlanningSent,
    AwaitingModel,
    Routing(ProviderResponse),
    Done,
    BudgetExhausted,
}

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// In-band protocol tokens
    markers: ProtocolMarkers,

    /// Iteration budget per run
    max_iterations: u32,

    /// Candidates requested per completion
    candidates: u32,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    /// Where runs are persisted
    run_log: Option<Arc<dyn RunLog>>,

    /// Persist after every iteration as well as at the end
    checkpoints: bool,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            markers: ProtocolMarkers::default(),
            max_iterations: 4,
            candidates: 1,
            event_bus,
            run_log: None,
            checkpoints: false,
        }
    }

    /// Create an agent loop with model, budget and markers taken from config.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new(
            provider,
            &config.default_model,
            config.default_temperature,
            tools,
            event_bus,
        )
        .with_max_tokens(config.default_max_tokens)
        .with_max_iterations(config.agent.max_iterations)
        .with_candidates(config.agent.candidates)
        .with_markers(config.markers.clone())
        .with_checkpoints(config.agent.checkpoint_every_iteration)
    }

    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the number of candidates requested per completion (at least 1).
    pub fn with_candidates(mut self, n: u32) -> Self {
        self.candidates = n.max(1);
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_markers(mut self, markers: ProtocolMarkers) -> Self {
        self.markers = markers;
        self
    }

    /// Attach a run log.
    pub fn with_run_log(mut self, run_log: Arc<dyn RunLog>) -> Self {
        self.run_log = Some(run_log);
        self
    }

    /// Also persist after every iteration (best-effort).
    pub fn with_checkpoints(mut self, enabled: bool) -> Self {
        self.checkpoints = enabled;
        self
    }

    /// Answer `question` in a fresh conversation.
    pub async fn process(&self, question: &str) -> Result<RunOutcome, Error> {
        self.process_with_history(Vec::new(), question).await
    }

    /// Answer `question` on top of an earlier conversation.
    ///
    /// Plan, step, budget, invalid list and tool records start fresh; only
    /// the messages carry over.
    ///
    /// A provider failure or a non-recoverable tool failure aborts the run
    /// without persisting it.
    pub async fn process_with_history(
        &self,
        history: Vec<Message>,
        question: &str,
    ) -> Result<RunOutcome, Error> {
        let tracker = PlanTracker::new(&self.markers).map_err(|e| Error::Config {
            message: format!("step label does not form a valid pattern: {e}"),
        })?;
        let invoker = FunctionInvoker::new(self.tools.clone(), self.markers.clone());

        let budget = self.max_iterations;
        let run_id = run_id(Local::now(), question);
        let mut state = ConversationState::new(MessageLog::from(history), budget);
        let run_start = state.message_log.len();

        info!(run_id = %run_id, budget, candidates = self.candidates, "Starting run");
        self.event_bus.publish(DomainEvent::RunStarted {
            run_id: run_id.clone(),
            budget,
            timestamp: Utc::now(),
        });

        state.push(Message::user(question));
        state.push(Message::system(planning_directive(
            &self.markers,
            &self.tools.names(),
            budget,
        )));

        let definitions = self.tools.definitions();
        let mut consumed = 0u32;
        let mut phase = Phase::PlanningSent;

        let status = loop {
            phase = match phase {
                Phase::PlanningSent | Phase::AwaitingModel => {
                    if state.terminal {
                        Phase::Done
                    } else if state.remaining_iterations == 0 {
                        Phase::BudgetExhausted
                    } else {
                        state.passed = false;
                        debug!(
                            run_id = %run_id,
                            iteration = consumed + 1,
                            step = state.current_step,
                            "Requesting completion"
                        );
                        let request = ProviderRequest {
                            model: self.model.clone(),
                            messages: state.message_log.messages().to_vec(),
                            temperature: self.temperature,
                            max_tokens: self.max_tokens,
                            functions: definitions.clone(),
                            n: self.candidates,
                        };
                        Phase::Routing(self.provider.complete(request).await?)
                    }
                }
                Phase::Routing(response) => {
                    consumed += 1;
                    self.route(&run_id, consumed, &tracker, &invoker, &mut state, response)
                        .await?;
                    state.remaining_iterations = state.remaining_iterations.saturating_sub(1);

                    if self.checkpoints {
                        self.checkpoint(&run_id, consumed, &state).await;
                    }
                    Phase::AwaitingModel
                }
                Phase::Done => break RunStatus::Completed,
                Phase::BudgetExhausted => break RunStatus::OutOfIterations,
            };
        };

        match status {
            RunStatus::Completed => info!(run_id = %run_id, iterations = consumed, "Run completed"),
            RunStatus::OutOfIterations => {
                warn!(run_id = %run_id, iterations = consumed, "Ran out of iterations")
            }
        }

        let log_error = self.persist_final(&run_id, consumed, &state).await;

        self.event_bus.publish(DomainEvent::RunFinished {
            run_id: run_id.clone(),
            iterations: consumed,
            terminal: state.terminal,
            timestamp: Utc::now(),
        });

        let answer = state.message_log.messages()[run_start..]
            .iter()
            .rev()
            .filter(|m| matches!(m, Message::Assistant { .. }))
            .find_map(|m| m.content().filter(|c| !c.trim().is_empty()))
            .map(|c| self.markers.strip_terminal(c));

        Ok(RunOutcome {
            run_id,
            status,
            iterations: consumed,
            answer,
            state,
            log_error,
        })
    }

    /// Validate, append and act on every candidate of one batch, in order.
    async fn route(
        &self,
        run_id: &str,
        iteration: u32,
        tracker: &PlanTracker,
        invoker: &FunctionInvoker,
        state: &mut ConversationState,
        response: ProviderResponse,
    ) -> Result<(), Error> {
        let total = response.choices.len();
        let mut accepted = Vec::with_capacity(total);

        for candidate in response.choices {
            match validate_candidate(&candidate) {
                Ok(()) => accepted.push(candidate),
                Err(reason) => {
                    warn!(run_id, iteration, reason = %reason, "Candidate rejected");
                    self.event_bus.publish(DomainEvent::CandidateRejected {
                        run_id: run_id.to_string(),
                        reason: reason.clone(),
                        timestamp: Utc::now(),
                    });
                    state.invalid_messages.push(reason);
                }
            }
        }

        self.event_bus.publish(DomainEvent::CompletionReceived {
            run_id: run_id.to_string(),
            iteration,
            candidates: total,
            valid: accepted.len(),
            tokens_used: response.usage.map(|u| u.total_tokens),
            timestamp: Utc::now(),
        });

        for candidate in accepted {
            state.push(candidate.clone());

            if let Some(content) = candidate.content() {
                self.track_content(run_id, tracker, state, content);
            }

            if let Some(call) = candidate.proposed_call() {
                match invoker.invoke(call, state).await? {
                    Invocation::Completed {
                        tool_name,
                        outcome,
                        duration_ms,
                    } => {
                        info!(run_id, iteration, tool = %tool_name, ?outcome, duration_ms, "Tool executed");
                        self.event_bus.publish(DomainEvent::ToolExecuted {
                            run_id: run_id.to_string(),
                            tool_name,
                            outcome,
                            duration_ms,
                            timestamp: Utc::now(),
                        });
                    }
                    Invocation::Skipped { tool_name } => {
                        debug!(run_id, iteration, tool = %tool_name, "Redundant query skipped");
                    }
                }
            }
        }

        Ok(())
    }

    /// Plan capture, step tracking and terminal detection for one message.
    fn track_content(
        &self,
        run_id: &str,
        tracker: &PlanTracker,
        state: &mut ConversationState,
        content: &str,
    ) {
        let next_step = if !state.plan_captured && tracker.is_plan(content) {
            state.plan = tracker.extract_plan(content);
            state.plan_captured = true;
            info!(run_id, steps = state.plan.len(), "Plan captured");
            self.event_bus.publish(DomainEvent::PlanCaptured {
                run_id: run_id.to_string(),
                steps: state.plan.clone(),
                timestamp: Utc::now(),
            });
            // The plan itself talks about steps; only an explicit marker moves the counter.
            tracker.step_marker(content)
        } else if tracker.mentions_step(content) {
            Some(tracker.update_step(content, state.current_step))
        } else {
            None
        };

        if let Some(previous) = next_step.and_then(|step| state.advance_step(step)) {
            debug!(run_id, from = previous, to = state.current_step, "Step advanced");
            self.event_bus.publish(DomainEvent::StepAdvanced {
                run_id: run_id.to_string(),
                from: previous,
                to: state.current_step,
                timestamp: Utc::now(),
            });
        }

        if self.markers.is_terminal(content) {
            state.terminal = true;
        }
    }

    async fn checkpoint(&self, run_id: &str, consumed: u32, state: &ConversationState) {
        let Some(run_log) = &self.run_log else {
            return;
        };
        let label = iteration_label(consumed, self.max_iterations, state.current_step);
        let snapshot = state.snapshot(&self.model, self.temperature);
        if let Err(e) = run_log.persist(run_id, &label, &snapshot).await {
            warn!(run_id, label = %label, error = %e, "Checkpoint write failed");
        }
    }

    /// The one mandatory write at loop exit. Failure is reported, not fatal.
    async fn persist_final(
        &self,
        run_id: &str,
        consumed: u32,
        state: &ConversationState,
    ) -> Option<RunLogError> {
        let run_log = self.run_log.as_ref()?;
        let label = iteration_label(consumed, self.max_iterations, state.current_step);
        let snapshot = state.snapshot(&self.model, self.temperature);

        match run_log.persist(run_id, &label, &snapshot).await {
            Ok(()) => {
                debug!(run_id, label = %label, backend = run_log.name(), "Run persisted");
                None
            }
            Err(e) => {
                error!(run_id, label = %label, error = %e, "Failed to persist run log");
                Some(e)
            }
        }
    }
}

/// Run identifier: local timestamp plus the question.
pub fn run_id(at: DateTime<Local>, question: &str) -> String {
    format!("{} | {}", at.format("%Y-%m-%d %H:%M:%S"), question)
}

/// Label under which a run's state is stored.
pub fn iteration_label(consumed: u32, budget: u32, current_step: u32) -> String {
    format!("iteration {consumed}/{budget} step {current_step}")
}

/// Reasons a candidate never enters the message log.
///
/// Argument text that is present but not JSON passes; the invoker turns
/// it into an `invalid_args` result the model can learn from.
pub fn validate_candidate(message: &Message) -> Result<(), String> {
    let Message::Assistant {
        content,
        function_call,
    } = message
    else {
        return Err(format!(
            "Invalid message: expected an assistant message, got {}",
            message.role()
        ));
    };

    match function_call {
        None if content.as_deref().is_none_or(|c| c.trim().is_empty()) => {
            Err("Invalid message: no content and no function call".into())
        }
        None => Ok(()),
        Some(call) if call.name.trim().is_empty() => {
            Err("Invalid function call: empty function name".into())
        }
        Some(call) if call.arguments.trim().is_empty() => Err(format!(
            "Invalid function call: {} has no arguments",
            call.name
        )),
        Some(_) => Ok(()),
    }
}
