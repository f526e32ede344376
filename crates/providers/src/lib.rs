//! LLM provider implementations for naturalmaps.
//!
//! All providers implement the `naturalmaps_core::Provider` trait.

pub mod openai_compat;

use std::sync::Arc;

use naturalmaps_config::AppConfig;
use naturalmaps_core::provider::Provider;

pub use openai_compat::OpenAiCompatProvider;

/// Build the configured default provider.
///
/// A `[providers.<name>]` entry for the default provider supplies its key
/// and URL; otherwise the top-level key and the well-known URL are used.
pub fn build_provider(config: &AppConfig) -> Arc<dyn Provider> {
    let name = config.default_provider.as_str();
    let entry = config.providers.get(name);

    let api_key = entry
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone())
        .unwrap_or_default();
    let base_url = entry
        .and_then(|p| p.api_url.clone())
        .unwrap_or_else(|| default_base_url(name));

    Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
}

fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
