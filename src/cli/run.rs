use agent_core::{AgentLoopResult, Assistant, ExplorationReport};
use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::Value;

use super::context::CliContext;
use super::memory::format_memory;
use super::output::render;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// What the agent should do, in plain language
    #[arg(required = true, num_args = 1..)]
    pub task: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ExploreArgs {
    /// Site to explore, e.g. docs.rs or https://docs.rs
    pub url: String,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<()> {
    let assistant = ctx.build_assistant()?;
    let result = assistant.run_task(&args.task.join(" ")).await;
    print_result(ctx, &result)?;
    shutdown(&assistant).await;
    if !result.is_success() {
        bail!(
            "task failed after {} iteration(s): {}",
            result.iterations,
            result
                .failure
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn cmd_explore(args: ExploreArgs, ctx: &CliContext) -> Result<()> {
    let assistant = ctx.build_assistant()?;
    let outcome = assistant.explore(&args.url).await;
    shutdown(&assistant).await;
    let report = outcome.with_context(|| format!("Exploration of {} failed", args.url))?;
    print_exploration(ctx, &report)
}

pub async fn cmd_interactive(ctx: &CliContext) -> Result<()> {
    let assistant = ctx.build_assistant()?;
    println!("webpilot interactive mode");
    println!("Type a task, 'explore <url>', 'show memory', 'clear memory', or 'exit'.");

    let outcome = repl(ctx, &assistant).await;
    shutdown(&assistant).await;
    outcome
}

async fn repl(ctx: &CliContext, assistant: &Assistant) -> Result<()> {
    loop {
        let Some(line) = prompt_line(ctx, assistant, "\nEnter a task (or command): ").await else {
            break;
        };
        let input = line.trim();
        match ReplCommand::parse(input) {
            ReplCommand::Empty => continue,
            ReplCommand::Exit => break,
            ReplCommand::ShowMemory => {
                print!("{}", format_memory(&assistant.get_memory_snapshot(), None));
            }
            ReplCommand::ClearMemory => {
                let Some(answer) = prompt_line(
                    ctx,
                    assistant,
                    "Clear all memory or a specific category? (all/<category>): ",
                )
                .await
                else {
                    break;
                };
                let category = match answer.trim() {
                    "" => {
                        println!("Nothing cleared.");
                        continue;
                    }
                    scope if scope.eq_ignore_ascii_case("all") => None,
                    scope => Some(scope),
                };
                let removed = assistant.clear_memory(category)?;
                println!("Memory cleared ({removed} fact(s) removed).");
            }
            ReplCommand::Explore(url) => match assistant.explore(url).await {
                Ok(report) => print_exploration(ctx, &report)?,
                Err(err) => println!("Exploration failed: {err}"),
            },
            ReplCommand::Task(task) => {
                let result = assistant.run_task(task).await;
                print_result(ctx, &result)?;
            }
        }
        if assistant.cancel_token().is_cancelled() {
            println!("Interrupted; leaving interactive mode.");
            break;
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand<'a> {
    Empty,
    Exit,
    ShowMemory,
    ClearMemory,
    Explore(&'a str),
    Task(&'a str),
}

impl<'a> ReplCommand<'a> {
    fn parse(input: &'a str) -> Self {
        let lowered = input.to_ascii_lowercase();
        match lowered.as_str() {
            "" => ReplCommand::Empty,
            "exit" | "quit" => ReplCommand::Exit,
            "show memory" => ReplCommand::ShowMemory,
            "clear memory" => ReplCommand::ClearMemory,
            _ => match lowered.strip_prefix("explore ") {
                Some(_) => ReplCommand::Explore(input["explore ".len()..].trim()),
                None => ReplCommand::Task(input),
            },
        }
    }
}

/// Next console line. `None` on end of input or once Ctrl-C has cancelled
/// the assistant.
async fn prompt_line(ctx: &CliContext, assistant: &Assistant, prompt: &str) -> Option<String> {
    let cancel = assistant.cancel_token();
    tokio::select! {
        _ = cancel.cancelled() => None,
        line = ctx.console().read_line(prompt) => line,
    }
}

fn print_result(ctx: &CliContext, result: &AgentLoopResult) -> Result<()> {
    if let Some(text) = render(ctx.output(), result)? {
        println!("{text}");
        return Ok(());
    }
    println!();
    println!("{}", result.summary);
    if ctx.config().debug.enabled && !result.history.is_empty() {
        println!("\nSteps:");
        for entry in &result.history {
            println!("  {}", entry.summary());
        }
    }
    Ok(())
}

fn print_exploration(ctx: &CliContext, report: &ExplorationReport) -> Result<()> {
    if let Some(text) = render(ctx.output(), report)? {
        println!("{text}");
        return Ok(());
    }
    println!("\nExplored {} ({} page(s) crawled)", report.host, report.pages_crawled.len());
    if let Some(overview) = &report.loop_result.final_output {
        println!("Overview: {overview}");
    } else if let Some(failure) = &report.loop_result.failure {
        println!("Discovery run failed: {failure}");
    }
    if report.entries.is_empty() {
        println!("No facts recorded.");
    }
    for entry in &report.entries {
        let value = match &entry.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        println!("  [{}] {}: {}", entry.category, entry.key, value);
    }
    Ok(())
}

async fn shutdown(assistant: &Assistant) {
    if let Err(err) = assistant.shutdown().await {
        tracing::warn!(error = %err, "browser did not shut down cleanly");
    }
}
