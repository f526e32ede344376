//! `naturalmaps chat` — Interactive multi-turn mode.

use std::io::{BufRead, Write};
use std::sync::Arc;

use naturalmaps_core::event::EventBus;
use naturalmaps_core::message::Message;

use super::ask::{print_outcome, spawn_progress};
use super::{Overrides, build_agent};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let event_bus = Arc::new(EventBus::default());
    let progress = spawn_progress(event_bus.subscribe());
    let (agent, config) = build_agent(Overrides::default(), event_bus)?;

    println!();
    println!("  naturalmaps — Interactive Mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Run log:   {}", config.run_log.path().display());
    println!();
    println!("  Ask about places, e.g. \"Which parks in Pankow have a playground?\"");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut history: Vec<Message> = Vec::new();
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        match agent.process_with_history(history.clone(), question).await {
            Ok(outcome) => {
                print_outcome(&outcome);
                if let Some(e) = &outcome.log_error {
                    eprintln!("  [Run log] {e}");
                }
                history = outcome.state.message_log.into_messages();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    drop(agent);
    let _ = progress.await;
    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
