//! Subcommand implementations.

pub mod ask;
pub mod chat;
pub mod onboard;
pub mod runs;

use std::sync::Arc;

use naturalmaps_agent::AgentLoop;
use naturalmaps_config::AppConfig;
use naturalmaps_core::event::EventBus;
use naturalmaps_runlog::JsonFileRunLog;
use tracing::debug;

/// Per-invocation overrides of configured agent settings.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub iterations: Option<u32>,
    pub candidates: Option<u32>,
    pub temperature: Option<f32>,
}

/// Load config and wire provider, tools and run log into an agent loop.
pub fn build_agent(
    overrides: Overrides,
    event_bus: Arc<EventBus>,
) -> Result<(AgentLoop, AppConfig), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(temperature) = overrides.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(format!("temperature must be between 0.0 and 2.0, got {temperature}").into());
        }
        config.default_temperature = temperature;
    }
    if let Some(iterations) = overrides.iterations {
        config.agent.max_iterations = iterations;
    }
    if let Some(candidates) = overrides.candidates {
        if candidates == 0 {
            return Err("candidates must be at least 1".into());
        }
        config.agent.candidates = candidates;
    }

    // Local servers run without a key
    if !config.has_api_key() && config.default_provider != "ollama" {
        print_missing_key_help();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = naturalmaps_providers::build_provider(&config);

    let tools = Arc::new(naturalmaps_tools::default_registry(&config));
    let run_log = Arc::new(JsonFileRunLog::new(config.run_log.path()));

    debug!(
        provider = provider.name(),
        tools = ?tools.names(),
        run_log = %run_log.path().display(),
        "Agent ready"
    );

    let agent = AgentLoop::from_config(&config, provider, tools, event_bus).with_run_log(run_log);
    Ok((agent, config))
}

fn print_missing_key_help() {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    export OPENAI_API_KEY='sk-...'          (recommended)");
    eprintln!("    export OPENROUTER_API_KEY='sk-or-v1-...'");
    eprintln!("    export NATURALMAPS_API_KEY='sk-...'     (generic)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
}
