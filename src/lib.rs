//! coursegen: learning-plan delivery and task generation orchestration
//!
//! Two cooperating pieces: a session registry that relays plans pushed by an
//! external generator to the one browser session waiting for them, and a
//! bounded-concurrency queue that generates a quiz or coding task for every
//! plan step with retries, change detection and cached results.

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod provider;
pub mod server;
pub mod sessions;
pub mod types;

pub use error::ApiError;
pub use generation::{Orchestrator, TaskGenerator};
pub use sessions::SessionRegistry;
