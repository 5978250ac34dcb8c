use anyhow::Result;

use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::memory::cmd_memory;
use super::run::{cmd_explore, cmd_interactive, cmd_run};

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx).await,
        Commands::Interactive => cmd_interactive(ctx).await,
        Commands::Explore(args) => cmd_explore(args, ctx).await,
        Commands::Memory(args) => cmd_memory(args, ctx).await,
    }
}
