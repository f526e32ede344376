//! `naturalmaps runs` — Read back the persisted run log.

use naturalmaps_config::AppConfig;
use naturalmaps_core::message::Message;
use naturalmaps_core::runlog::RunLog;
use naturalmaps_runlog::JsonFileRunLog;

use crate::RunsAction;

pub async fn run(action: RunsAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let log = JsonFileRunLog::new(config.run_log.path());

    match action {
        RunsAction::List => {
            let ids = log.run_ids().await?;
            if ids.is_empty() {
                println!("No runs logged at {}", log.path().display());
            }
            for id in ids {
                println!("{id}");
            }
        }
        RunsAction::Show { run_id } => {
            let Some(entries) = log.load(&run_id).await? else {
                return Err(format!("No run '{run_id}' in {}", log.path().display()).into());
            };
            for (label, snapshot) in &entries {
                println!("== {label} ==");
                println!(
                    "  model: {}  temperature: {}  terminal: {}",
                    snapshot.model, snapshot.temperature, snapshot.terminal
                );
                for step in &snapshot.plan {
                    println!("  plan: {step}");
                }
                for message in snapshot.valid_messages.iter() {
                    println!("  {}", describe(message));
                }
                for reason in &snapshot.invalid_messages {
                    println!("  rejected: {reason}");
                }
                for (key, record) in &snapshot.tool_call_records {
                    println!("  record [{key}] {} -> {:?}", record.tool_name, record.outcome);
                }
                println!();
            }
        }
    }

    Ok(())
}

fn describe(message: &Message) -> String {
    let content = message.content().unwrap_or("").trim();
    match message.proposed_call() {
        Some(call) => format!("{}: {content} -> {}({})", message.role(), call.name, call.arguments),
        None => format!("{}: {content}", message.role()),
    }
}
