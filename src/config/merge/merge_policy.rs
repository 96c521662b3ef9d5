//! Merge rules: defaults first, then files, then environment overrides.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

pub const ENV_PREFIX: &str = "COURSEGEN";
pub const ENV_SEPARATOR: &str = "__";

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("server.bind", "127.0.0.1:3000")?
        .set_default("queue.max_concurrency", 2_i64)?
        .set_default("queue.max_retries", 2_i64)?
        .set_default("generator.endpoint", "http://127.0.0.1:5000")?
        .set_default("logging.level", "info")
}

/// `COURSEGEN__QUEUE__MAX_CONCURRENCY=4` overrides `queue.max_concurrency`.
pub fn environment_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}
