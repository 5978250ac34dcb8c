//! webpilot: an autonomous web assistant.
//!
//! The control loop lives in `agent-core`; this crate wires it to Chromium,
//! an OpenAI-compatible vision oracle and the terminal.

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod errors;
pub mod llm;
pub mod operator;

pub use config::AppConfig;
pub use errors::AppError;
