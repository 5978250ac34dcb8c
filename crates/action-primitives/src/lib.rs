//! Browser primitives for webpilot.
//!
//! This crate owns the contract between the agent and a live browser:
//! - [`BrowserSession`]: open, observe, perform, close
//! - [`Primitive`]: the low-level operations a session understands
//! - [`Target`]: best-effort element targeting from a free-form hint
//! - [`ActionError`]: failures, with `SessionLost` as the only fatal one

pub mod errors;
mod locator;
mod session;
pub mod types;

pub use errors::*;
pub use locator::*;
pub use session::*;
pub use types::*;
