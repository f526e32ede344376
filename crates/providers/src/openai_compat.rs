//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, and any endpoint that
//! exposes `/v1/chat/completions` with the `functions` protocol.
//!
//! Supports:
//! - Chat completions with `n` candidate choices
//! - Function calling (`functions` + `function_call: "auto"`)

use async_trait::async_trait;
use naturalmaps_core::error::ProviderError;
use naturalmaps_core::message::{FunctionCall, Message};
use naturalmaps_core::provider::*;
use serde::Deserialize;
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Build the JSON request body.
    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "n": request.n.max(1),
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.functions.is_empty() {
            body["functions"] = serde_json::json!(request.functions);
            body["function_call"] = serde_json::json!("auto");
        }

        body
    }

    /// Convert the API choices into candidate messages, ordered by index.
    ///
    /// The role is kept as the server sent it so candidate validation can
    /// reject anything that is not an assistant turn. A missing role is
    /// read as `assistant`.
    fn to_candidates(mut choices: Vec<ApiChoice>) -> Vec<Message> {
        choices.sort_by_key(|c| c.index);
        choices.into_iter().map(|c| c.message.into_message()).collect()
    }
}

/// Map a non-success HTTP status to the matching provider error.
fn status_error(status: u16, body: String) -> Option<ProviderError> {
    match status {
        200 => None,
        429 => Some(ProviderError::RateLimited {
            retry_after_secs: 5,
        }),
        401 | 403 => Some(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        _ => Some(ProviderError::ApiError {
            status_code: status,
            message: body,
        }),
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            n = request.n,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(status_error(status, error_body)
                .expect("status_error returns Some for every non-200 status"));
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        if api_response.choices.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            choices: Self::to_candidates(api_response.choices),
            usage,
            model: api_response.model,
        })
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<ApiFunctionCall>,
}

impl ApiMessage {
    fn into_message(self) -> Message {
        match self.role.as_deref() {
            Some("user") => Message::user(self.content.unwrap_or_default()),
            Some("system") => Message::system(self.content.unwrap_or_default()),
            Some("function") => Message::function_result(
                self.name.unwrap_or_default(),
                self.content.unwrap_or_default(),
            ),
            _ => Message::Assistant {
                content: self.content,
                function_call: self.function_call.map(|fc| FunctionCall {
                    name: fc.name,
                    arguments: fc.arguments.unwrap_or_default(),
                }),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    use naturalmaps_core::message::Role;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Answer a single request with `status` and `body`.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/v1")
    }

    /// Consume headers and the JSON body so closing the socket is clean.
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length: usize = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }

    fn plain_request() -> ProviderRequest {
        ProviderRequest {
            model: "gpt-3.5-turbo-0613".into(),
            messages: vec![Message::user("Find parks in Pankow")],
            temperature: 0.1,
            max_tokens: None,
            functions: vec![],
            n: 1,
        }
    }

    #[test]
    fn constructor_trims_slash() {
        let p = OpenAiCompatProvider::new("ollama", "http://gpu-box:11434/v1/", "ollama");
        assert_eq!(p.name(), "ollama");
        assert_eq!(p.base_url, "http://gpu-box:11434/v1");
    }

    #[test]
    fn status_mapping() {
        assert!(status_error(200, String::new()).is_none());
        assert!(matches!(
            status_error(429, String::new()),
            Some(ProviderError::RateLimited { retry_after_secs: 5 })
        ));
        assert!(matches!(
            status_error(401, String::new()),
            Some(ProviderError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            status_error(403, String::new()),
            Some(ProviderError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            status_error(500, "upstream overloaded".into()),
            Some(ProviderError::ApiError { status_code: 500, message }) if message == "upstream overloaded"
        ));
    }

    #[tokio::test]
    async fn rate_limited_response_is_an_error() {
        let base_url = serve_once("429 Too Many Requests", r#"{"error":"slow down"}"#).await;
        let provider = OpenAiCompatProvider::new("openai", base_url, "sk-test");
        let err = provider.complete(plain_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn server_error_keeps_body() {
        let base_url = serve_once("502 Bad Gateway", "bad gateway").await;
        let provider = OpenAiCompatProvider::new("openai", base_url, "sk-test");
        let err = provider.complete(plain_request()).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::ApiError { status_code: 502, message } if message == "bad gateway"
        ));
    }

    #[tokio::test]
    async fn ok_response_becomes_candidates() {
        let base_url = serve_once(
            "200 OK",
            r#"{"model":"gpt-3.5-turbo-0613","choices":[{"index":0,"message":{"role":"assistant","content":"Here's the plan:"}}]}"#,
        )
        .await;
        let provider = OpenAiCompatProvider::new("openai", base_url, "sk-test");
        let response = provider.complete(plain_request()).await.unwrap();
        assert_eq!(response.model, "gpt-3.5-turbo-0613");
        assert_eq!(response.choices, vec![Message::assistant("Here's the plan:")]);
    }

    #[test]
    fn body_carries_functions_and_n() {
        let request = ProviderRequest {
            model: "gpt-3.5-turbo-0613".into(),
            messages: vec![Message::user("Find toilets in Charlottenburg")],
            temperature: 0.1,
            max_tokens: None,
            functions: vec![FunctionDefinition {
                name: "overpass_query".into(),
                description: "Run an Overpass QL query".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            n: 3,
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["n"], 3);
        assert_eq!(body["function_call"], "auto");
        assert_eq!(body["functions"][0]["name"], "overpass_query");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn body_omits_functions_when_none_registered() {
        let request = ProviderRequest {
            model: "m".into(),
            messages: vec![],
            temperature: 0.1,
            max_tokens: Some(256),
            functions: vec![],
            n: 0,
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert!(body.get("functions").is_none());
        assert!(body.get("function_call").is_none());
        assert_eq!(body["n"], 1);
        assert_eq!(body["max_tokens"], 256);
    }

    #[test]
    fn parses_choices_in_index_order() {
        let raw = serde_json::json!({
            "model": "gpt-3.5-turbo-0613",
            "choices": [
                {
                    "index": 1,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "function_call": {
                            "name": "overpass_query",
                            "arguments": "{\"human_prompt\": \"parks\"}"
                        }
                    }
                },
                {
                    "index": 0,
                    "message": { "role": "assistant", "content": "Here's the plan:\n1. Find parks" }
                }
            ],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let candidates = OpenAiCompatProvider::to_candidates(parsed.choices);

        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].content().unwrap().starts_with("Here's the plan:"));
        let call = candidates[1].proposed_call().unwrap();
        assert_eq!(call.name, "overpass_query");
        assert!(call.arguments.contains("human_prompt"));
    }

    #[test]
    fn missing_arguments_become_empty_text() {
        let raw = serde_json::json!({
            "choices": [{ "message": { "function_call": { "name": "get_place_info" } } }]
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let candidates = OpenAiCompatProvider::to_candidates(parsed.choices);
        assert_eq!(candidates[0].role(), Role::Assistant);
        assert_eq!(candidates[0].proposed_call().unwrap().arguments, "");
    }

    #[test]
    fn non_assistant_roles_are_kept() {
        let raw = serde_json::json!({
            "choices": [
                { "index": 0, "message": { "role": "user", "content": "Find parks" } },
                { "index": 1, "message": { "role": "function", "name": "overpass_query", "content": "{}" } },
                { "index": 2, "message": { "role": "system", "content": "Stop" } }
            ]
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let candidates = OpenAiCompatProvider::to_candidates(parsed.choices);
        assert_eq!(candidates[0], Message::user("Find parks"));
        assert_eq!(candidates[1], Message::function_result("overpass_query", "{}"));
        assert_eq!(candidates[2].role(), Role::System);
        assert!(candidates.iter().all(|c| c.proposed_call().is_none()));
    }
}
