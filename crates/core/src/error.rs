//! Error types for the naturalmaps domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all naturalmaps operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Run log errors ---
    #[error("Run log error: {0}")]
    RunLog(#[from] RunLogError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the language-model completion interface.
///
/// None of these are retried by the agent loop; they end the run.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned no candidates")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

impl ToolError {
    /// Whether the agent loop reports this back into the conversation
    /// instead of aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ToolError::NotFound(_) | ToolError::InvalidArguments(_))
    }
}

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Run log at {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn only_input_errors_are_recoverable() {
        assert!(ToolError::NotFound("x".into()).is_recoverable());
        assert!(ToolError::InvalidArguments("missing field".into()).is_recoverable());
        assert!(
            !ToolError::ExecutionFailed {
                tool_name: "overpass_query".into(),
                reason: "socket closed".into(),
            }
            .is_recoverable()
        );
        assert!(
            !ToolError::Timeout {
                tool_name: "overpass_query".into(),
                timeout_secs: 60,
            }
            .is_recoverable()
        );
    }

    #[test]
    fn run_log_error_mentions_path() {
        let err = Error::RunLog(RunLogError::Corrupt {
            path: "/tmp/runs.json".into(),
            reason: "expected value".into(),
        });
        assert!(err.to_string().contains("/tmp/runs.json"));
    }
}
