//! Command-line front end.

pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod memory;
pub mod output;
pub mod run;
pub mod runtime;

pub use app::run;
pub use env::CliArgs;
