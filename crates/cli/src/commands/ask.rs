//! `naturalmaps ask` — Answer one question and exit.

use std::sync::Arc;

use naturalmaps_agent::RunOutcome;
use naturalmaps_core::event::{DomainEvent, EventBus};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{Overrides, build_agent};

pub async fn run(question: &str, overrides: Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let event_bus = Arc::new(EventBus::default());
    let progress = spawn_progress(event_bus.subscribe());
    let (agent, config) = build_agent(overrides, event_bus)?;

    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Budget:    {} iterations", config.agent.max_iterations);
    println!();

    let result = agent.process(question).await;
    // The agent holds the last sender; dropping it lets the printer drain
    // queued events and stop.
    drop(agent);
    let _ = progress.await;
    let outcome = result?;

    print_outcome(&outcome);

    if let Some(e) = outcome.log_error {
        return Err(format!("Run finished but could not be logged: {e}").into());
    }
    Ok(())
}

/// Print plan, answer and budget status of a finished run.
pub fn print_outcome(outcome: &RunOutcome) {
    if !outcome.state.plan.is_empty() {
        println!();
        println!("  Plan:");
        for step in &outcome.state.plan {
            println!("    {step}");
        }
    }

    println!();
    match &outcome.answer {
        Some(answer) => {
            for line in answer.lines() {
                println!("  Assistant > {line}");
            }
        }
        None => println!("  (no answer)"),
    }

    if !outcome.is_completed() {
        println!();
        println!(
            "  Ran out of iterations after {} (step {}); the answer may be incomplete.",
            outcome.iterations, outcome.state.current_step
        );
    }
    println!();
}

/// Echo loop progress to stderr until every sender is gone. Resolves to
/// the number of lines written.
pub fn spawn_progress(mut rx: broadcast::Receiver<Arc<DomainEvent>>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut written = 0;
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if let Some(line) = progress_line(&event) {
                eprintln!("{line}");
                written += 1;
            }
        }
        written
    })
}

fn progress_line(event: &DomainEvent) -> Option<String> {
    let line = match event {
        DomainEvent::CompletionReceived {
            iteration,
            candidates,
            valid,
            ..
        } => format!("  [iteration {iteration}] {valid}/{candidates} candidates accepted"),
        DomainEvent::PlanCaptured { steps, .. } => format!("  [plan] {} steps", steps.len()),
        DomainEvent::StepAdvanced { from, to, .. } => format!("  [step] {from} -> {to}"),
        DomainEvent::ToolExecuted {
            tool_name,
            outcome,
            duration_ms,
            ..
        } => format!("  [tool] {tool_name}: {outcome:?} ({duration_ms}ms)"),
        DomainEvent::RunFinished {
            iterations,
            terminal,
            ..
        } => format!(
            "  [done] {iterations} iterations{}",
            if *terminal { "" } else { ", no final response" }
        ),
        _ => return None,
    };
    Some(line)
}
