//! Configuration System
//!
//! Layered configuration for the server, the generation queue, the session
//! sweep, the task-generation endpoint and logging. Sources merge in this
//! order: built-in defaults, the user config file, the project config files,
//! then `COURSEGEN__*` environment variables.

use crate::error::ApiError;
use crate::generation::GenerationConfig;
use crate::logging::LoggingConfig;
use crate::provider::GeneratorConfig;
use crate::sessions::SweepPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the server binds to
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ApiError> {
        self.bind
            .parse()
            .map_err(|e| ApiError::ConfigError(format!("Invalid bind address '{}': {}", self.bind, e)))
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoursegenConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Generation queue policy
    #[serde(default)]
    pub queue: GenerationConfig,

    /// Session sweep thresholds
    #[serde(default)]
    pub sessions: SweepPolicy,

    /// Task-generation endpoint
    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Server(String),
    Queue(String),
    Sessions(String),
    Generator(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Server(msg) => write!(f, "Server: {}", msg),
            ValidationError::Queue(msg) => write!(f, "Queue: {}", msg),
            ValidationError::Sessions(msg) => write!(f, "Sessions: {}", msg),
            ValidationError::Generator(msg) => write!(f, "Generator: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl CoursegenConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.server.socket_addr() {
            errors.push(ValidationError::Server(e.to_string()));
        }
        if let Err(e) = self.queue.validate() {
            errors.push(ValidationError::Queue(e));
        }
        if let Err(e) = self.sessions.validate() {
            errors.push(ValidationError::Sessions(e));
        }
        if let Err(e) = self.generator.validate() {
            errors.push(ValidationError::Generator(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Consume the config, returning it if valid.
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }
}
