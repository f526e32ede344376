//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send the message log to a model and get one or
//! more candidate completions back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-3.5-turbo-0613")
    pub model: String,

    /// The conversation so far
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Functions the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionDefinition>,

    /// Number of candidate completions to generate
    #[serde(default = "default_candidates")]
    pub n: u32,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_candidates() -> u32 {
    1
}

/// A function definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// The function name
    pub name: String,

    /// Description of what the function does
    pub description: String,

    /// JSON Schema describing the function's parameters
    pub parameters: serde_json::Value,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Candidate messages, in the order the model returned them
    pub choices: Vec<Message>,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The agent loop calls `complete()` without knowing which backend is in
/// use. Failures are returned as-is; the loop does not retry them.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get the candidate completions.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_defaults() {
        let req: ProviderRequest = serde_json::from_value(serde_json::json!({
            "model": "gpt-3.5-turbo-0613",
            "messages": [],
        }))
        .unwrap();
        assert!((req.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(req.n, 1);
        assert!(req.functions.is_empty());
    }

    #[test]
    fn function_definition_serialization() {
        let def = FunctionDefinition {
            name: "overpass_query".into(),
            description: "Run an Overpass QL query".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "generated_query": { "type": "string" }
                },
                "required": ["generated_query"]
            }),
        };
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains("overpass_query"));
        assert!(json.contains("generated_query"));
    }
}
