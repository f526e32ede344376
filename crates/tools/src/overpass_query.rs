//! Overpass query tool — runs model-generated Overpass QL against the
//! public interpreter.
//!
//! The tool never fails on a bad query or a bad response: whatever the
//! interpreter says is turned into JSON text (`elements`, or an `error` /
//! `warning` key) and handed back to the model so it can try again.

use std::time::Duration;

use async_trait::async_trait;
use naturalmaps_config::OverpassConfig;
use naturalmaps_core::error::ToolError;
use naturalmaps_core::tool::{ResultPolicy, Tool, ToolResult};
use tracing::{debug, warn};

const EMPTY_RESPONSE_WARNING: &str =
    "received an empty response from Overpass API. Tell the user.";

pub struct OverpassQueryTool {
    endpoint: String,
    max_result_chars: usize,
    client: reqwest::Client,
}

impl OverpassQueryTool {
    pub fn new(config: &OverpassConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            endpoint: config.endpoint.clone(),
            max_result_chars: config.max_result_chars,
            client,
        }
    }
}

#[async_trait]
impl Tool for OverpassQueryTool {
    fn name(&self) -> &str {
        "overpass_query"
    }

    fn description(&self) -> &str {
        "Run an Overpass QL query.\n\
         Instructions:\n\
         - Keep the queries simple and specific.\n\
         - Always use the Overpass built-in geocodeArea for locations, like this: \
         {{geocodeArea:charlottenburg}}->.searchArea;\n\
         - If running broad searches such as [node[~'^(amenity|leisure)$'~'.']({{bbox}});], \
         stick to only nodes.\n\
         - Remember to use square brackets around nodes.\n\
         Example for \"Find toilets in Charlottenburg\":\n\
         [out:json][timeout:25];\n\
         {{geocodeArea:charlottenburg}}->.searchArea;\n\
         (\n\
         node[\"amenity\"=\"toilets\"](area.searchArea);\n\
         way[\"amenity\"=\"toilets\"](area.searchArea);\n\
         relation[\"amenity\"=\"toilets\"](area.searchArea);\n\
         );\n\
         out body;\n\
         >;\n\
         out skel qt;"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "human_prompt": {
                    "type": "string",
                    "description": "The user message. Used for logging. Do not paraphrase."
                },
                "generated_query": {
                    "type": "string",
                    "description": "The Overpass QL query to execute. Request [out:json] output."
                }
            },
            "required": ["human_prompt", "generated_query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        arguments["human_prompt"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'human_prompt' argument".into()))?;
        let query = arguments["generated_query"].as_str().ok_or_else(|| {
            ToolError::InvalidArguments("Missing 'generated_query' argument".into())
        })?;

        let cleaned = clean_query(query);
        debug!(query = %cleaned, "Running Overpass query");

        let data = match self
            .client
            .get(&self.endpoint)
            .query(&[("data", cleaned.as_str())])
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(body) => interpret_body(status, &body),
                    Err(e) => serde_json::json!({ "error": format!("status {status}: {e}") }),
                }
            }
            Err(e) => {
                warn!(error = %e, "Overpass request failed");
                serde_json::json!({ "error": e.to_string() })
            }
        };

        let result = if data.get("elements").is_some() {
            ToolResult::ok(data.to_string())
        } else {
            ToolResult::failed(data.to_string())
        };
        Ok(result.with_executed_query(cleaned))
    }

    fn result_policy(&self) -> ResultPolicy {
        ResultPolicy::ElementCollection {
            max_chars: self.max_result_chars,
        }
    }

    /// Queries are recorded per user prompt, so a retry for the same prompt
    /// replaces the earlier attempt.
    fn record_key(&self, arguments: &serde_json::Value) -> Option<String> {
        arguments["human_prompt"].as_str().map(str::to_string)
    }
}

/// Normalise model-generated query text: models tend to emit escaped
/// newlines and stray backslashes that the interpreter rejects.
pub fn clean_query(query: &str) -> String {
    query
        .trim()
        .replace("\\n", "")
        .chars()
        .filter(|c| !matches!(c, '\\' | '\n' | '\r'))
        .collect()
}

/// Turn an interpreter response into the JSON document handed to the model.
fn interpret_body(status: u16, body: &str) -> serde_json::Value {
    if body.trim().is_empty() {
        return serde_json::json!({ "warning": EMPTY_RESPONSE_WARNING });
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value,
        Err(e) => serde_json::json!({ "error": format!("status {status}: {e}") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> OverpassQueryTool {
        OverpassQueryTool::new(&OverpassConfig::default())
    }

    #[test]
    fn clean_query_strips_escapes_and_newlines() {
        let raw = "  [out:json];\\n{{geocodeArea:charlottenburg}}->.searchArea;\nnode[\"amenity\"=\"bicycle_parking\"](area.searchArea);\r\nout;  ";
        let cleaned = clean_query(raw);
        assert!(!cleaned.contains('\\'));
        assert!(!cleaned.contains('\n'));
        assert!(cleaned.starts_with("[out:json];{{geocodeArea"));
        // Underscores in tag values survive.
        assert!(cleaned.contains("bicycle_parking"));
    }

    #[test]
    fn empty_body_becomes_warning() {
        let data = interpret_body(200, "   ");
        assert_eq!(data["warning"], EMPTY_RESPONSE_WARNING);
    }

    #[test]
    fn html_error_page_becomes_error() {
        let data = interpret_body(400, "<html><body>runtime error</body></html>");
        let error = data["error"].as_str().unwrap();
        assert!(error.starts_with("status 400"));
    }

    #[test]
    fn json_body_passes_through() {
        let data = interpret_body(200, r#"{"version":0.6,"elements":[]}"#);
        assert_eq!(data["elements"], serde_json::json!([]));
    }

    #[test]
    fn records_by_human_prompt() {
        let key = tool().record_key(&serde_json::json!({
            "human_prompt": "Find toilets in Charlottenburg",
            "generated_query": "[out:json];"
        }));
        assert_eq!(key.as_deref(), Some("Find toilets in Charlottenburg"));
    }

    #[test]
    fn policy_uses_configured_limit() {
        assert_eq!(
            tool().result_policy(),
            ResultPolicy::ElementCollection { max_chars: 4096 }
        );
    }

    #[tokio::test]
    async fn missing_query_is_invalid_arguments() {
        let err = tool()
            .execute(serde_json::json!({ "human_prompt": "parks" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_error_json() {
        let tool = OverpassQueryTool::new(&OverpassConfig {
            endpoint: "http://127.0.0.1:9/api/interpreter".into(),
            timeout_secs: 2,
            max_result_chars: 4096,
        });
        let result = tool
            .execute(serde_json::json!({
                "human_prompt": "parks",
                "generated_query": "[out:json];node(1);out;"
            }))
            .await
            .unwrap();
        assert!(!result.success);
        let data: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert!(data.get("error").is_some());
        assert_eq!(result.executed_query.as_deref(), Some("[out:json];node(1);out;"));
    }

    #[tokio::test]
    async fn executed_query_is_the_cleaned_text() {
        let tool = OverpassQueryTool::new(&OverpassConfig {
            endpoint: "http://127.0.0.1:9/api/interpreter".into(),
            timeout_secs: 2,
            max_result_chars: 4096,
        });
        let result = tool
            .execute(serde_json::json!({
                "human_prompt": "Find benches in Tiergarten",
                "generated_query": "[out:json];\\n{{geocodeArea:tiergarten}}->.a;\nnode[\"amenity\"=\"bench\"](area.a);\nout;"
            }))
            .await
            .unwrap();
        let executed = result.executed_query.unwrap();
        assert!(!executed.contains('\\'));
        assert!(!executed.contains('\n'));
        assert_eq!(
            executed,
            "[out:json];{{geocodeArea:tiergarten}}->.a;node[\"amenity\"=\"bench\"](area.a);out;"
        );
    }
}
