use clap::Subcommand;

use super::memory::MemoryArgs;
use super::run::{ExploreArgs, RunArgs};

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run one task and exit
    Run(RunArgs),

    /// Read tasks from the terminal until `exit`
    Interactive,

    /// Learn what a website offers and remember it
    Explore(ExploreArgs),

    /// Inspect or clear durable memory
    Memory(MemoryArgs),
}
