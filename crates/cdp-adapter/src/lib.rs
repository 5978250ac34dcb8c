//! Chromium-backed [`BrowserSession`](action_primitives::BrowserSession).
//!
//! One browser process and one page per session. The DevTools handler runs on
//! a background task; losing it surfaces as `ActionError::SessionLost`.

pub mod config;
pub mod error;
mod session;

pub use config::{detect_chrome_executable, ChromiumConfig};
pub use error::AdapterError;
pub use session::ChromiumSession;
