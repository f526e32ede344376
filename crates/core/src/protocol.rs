//! Protocol markers — the literal tokens the model and the loop agree on.
//!
//! The plan header, end-of-plan token, terminal sentinel and step label
//! form a tiny in-band wire protocol inside assistant content. They are
//! values rather than inline literals so configuration and tests can swap
//! them.

use serde::{Deserialize, Serialize};

/// Marker strings recognized in assistant content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMarkers {
    /// Header that opens the planning response
    #[serde(default = "default_plan_header")]
    pub plan_header: String,

    /// Token that closes the plan
    #[serde(default = "default_plan_end")]
    pub plan_end: String,

    /// Sentinel that ends the run when present anywhere in assistant content
    #[serde(default = "default_terminal")]
    pub terminal: String,

    /// Word used in step markers (`[step 3]`)
    #[serde(default = "default_step_label")]
    pub step_label: String,
}

fn default_plan_header() -> String {
    "Here's the plan:".into()
}
fn default_plan_end() -> String {
    "<END_OF_PLAN>".into()
}
fn default_terminal() -> String {
    "<final_response>".into()
}
fn default_step_label() -> String {
    "step".into()
}

impl ProtocolMarkers {
    /// The bracketed step marker for step `n`, e.g. `[step 3]`.
    pub fn step_tag(&self, n: u32) -> String {
        format!("[{} {}]", self.step_label, n)
    }

    /// Whether `text` carries the terminal sentinel.
    pub fn is_terminal(&self, text: &str) -> bool {
        text.contains(&self.terminal)
    }

    /// Remove the terminal sentinel for display.
    pub fn strip_terminal(&self, text: &str) -> String {
        text.replace(&self.terminal, "").trim().to_string()
    }

    /// Whether any marker is empty (which would match every message).
    pub fn has_empty_marker(&self) -> bool {
        [&self.plan_header, &self.plan_end, &self.terminal, &self.step_label]
            .iter()
            .any(|m| m.trim().is_empty())
    }
}

impl Default for ProtocolMarkers {
    fn default() -> Self {
        Self {
            plan_header: default_plan_header(),
            plan_end: default_plan_end(),
            terminal: default_terminal(),
            step_label: default_step_label(),
        }
    }
}
