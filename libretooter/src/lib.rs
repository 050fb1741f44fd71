//! Retooter - reblog Mastodon posts that mention an account
//!
//! This library holds configuration resolution, the authentication bootstrap
//! and the incremental reposting engine used by the `retooter` binary.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod retooter;
pub mod types;
pub mod watermark;

// Re-export commonly used types
pub use auth::{authenticate, AuthOutcome, Prompt, StdinPrompt};
pub use config::{Configuration, Credentials, Environment};
pub use error::{Result, RetooterError};
pub use retooter::{Retooter, RunSummary};
pub use types::{Mention, MentionedStatus, StatusId};
pub use watermark::Watermark;
