use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;
use super::output::OutputFormat;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable debug mode: verbose logs, screenshots and a log file
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human", global = true)]
    pub output: OutputFormat,

    /// Memory file (overrides memory.path)
    #[arg(long, value_name = "PATH", global = true)]
    pub memory_file: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long, global = true)]
    pub headless: bool,

    /// Iteration ceiling per task (overrides agent.max_iterations)
    #[arg(long, global = true)]
    pub max_iterations: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}
