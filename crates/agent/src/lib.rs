//! The naturalmaps agent loop.
//!
//! A run follows a **Plan → Query → Check step** cycle:
//!
//! 1. **Plan**: a system directive asks the model for a numbered plan
//! 2. **Complete**: request `n` candidate completions
//! 3. **Route** each valid candidate: capture the plan, follow the step
//!    counter, run any function call and append its result
//! 4. **Repeat** until the terminal sentinel appears or the iteration
//!    budget is spent
//! 5. **Persist** the final state to the run log

pub mod directives;
pub mod invoker;
pub mod loop_runner;
pub mod plan;
pub mod state;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use invoker::{FunctionInvoker, Invocation};
pub use loop_runner::{AgentLoop, RunOutcome, RunStatus, iteration_label, run_id};
pub use plan::PlanTracker;
pub use state::ConversationState;
