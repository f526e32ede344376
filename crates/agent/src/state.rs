//! Conversation state — everything one run mutates.

use naturalmaps_core::message::{Message, MessageLog};
use naturalmaps_core::runlog::{RunSnapshot, ToolCallRecords};

/// The state of a single run.
///
/// Created fresh per question and owned by the agent loop for the whole
/// run; the function invoker and plan tracker only see it through `&mut`.
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// Accepted messages, in order. Only ever grows.
    pub message_log: MessageLog,

    /// Rejection reasons for candidates that failed validation
    pub invalid_messages: Vec<String>,

    /// Steps of the captured plan
    pub plan: Vec<String>,

    /// Whether a plan was already captured this run (even an empty one)
    pub plan_captured: bool,

    /// Always at least 1
    pub current_step: u32,

    pub remaining_iterations: u32,

    /// Set once an assistant message carried the terminal sentinel
    pub terminal: bool,

    pub tool_call_records: ToolCallRecords,

    /// An element query succeeded in the current iteration
    pub passed: bool,
}

impl ConversationState {
    /// Start a run on top of earlier messages (empty for a fresh conversation).
    pub fn new(history: MessageLog, budget: u32) -> Self {
        Self {
            message_log: history,
            invalid_messages: Vec::new(),
            plan: Vec::new(),
            plan_captured: false,
            current_step: 1,
            remaining_iterations: budget,
            terminal: false,
            tool_call_records: ToolCallRecords::new(),
            passed: false,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.message_log.push(message);
    }

    /// Move the step counter to `step`. Returns the previous step when it
    /// actually changed.
    pub fn advance_step(&mut self, step: u32) -> Option<u32> {
        let step = step.max(self.current_step).max(1);
        if step == self.current_step {
            return None;
        }
        let previous = self.current_step;
        self.current_step = step;
        Some(previous)
    }

    /// Copy of the state in its persisted shape.
    pub fn snapshot(&self, model: &str, temperature: f32) -> RunSnapshot {
        RunSnapshot {
            model: model.to_string(),
            temperature,
            valid_messages: self.message_log.clone(),
            invalid_messages: self.invalid_messages.clone(),
            tool_call_records: self.tool_call_records.clone(),
            plan: self.plan.clone(),
            current_step: self.current_step,
            terminal: self.terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_starts_at_step_one() {
        let state = ConversationState::new(MessageLog::new(), 4);
        assert_eq!(state.current_step, 1);
        assert_eq!(state.remaining_iterations, 4);
        assert!(!state.terminal && !state.passed && !state.plan_captured);
    }

    #[test]
    fn advance_step_is_monotonic() {
        let mut state = ConversationState::new(MessageLog::new(), 4);
        assert_eq!(state.advance_step(3), Some(1));
        assert_eq!(state.advance_step(2), None);
        assert_eq!(state.advance_step(3), None);
        assert_eq!(state.current_step, 3);
    }

    #[test]
    fn snapshot_copies_log() {
        let mut state = ConversationState::new(MessageLog::new(), 4);
        state.push(Message::user("Where can I swim in Neukölln?"));
        state.invalid_messages.push("rejected".into());

        let snapshot = state.snapshot("gpt-3.5-turbo-0613", 0.1);
        assert_eq!(snapshot.valid_messages.len(), 1);
        assert_eq!(snapshot.invalid_messages, vec!["rejected"]);
        assert_eq!(snapshot.current_step, 1);
        assert_eq!(snapshot.model, "gpt-3.5-turbo-0613");
    }
}
