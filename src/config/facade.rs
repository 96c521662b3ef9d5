//! Loader entry points over the layered sources.

use crate::config::merge::merge_policy;
use crate::config::sources::{global_file, workspace_file};
use crate::config::CoursegenConfig;
use crate::error::ApiError;
use config::File;
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from defaults, the user file, `<root>/config/*.toml` and the environment.
    pub fn load(root: &Path) -> Result<CoursegenConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, root)?;
        let config: CoursegenConfig = builder
            .add_source(merge_policy::environment_source())
            .build()?
            .try_deserialize()?;
        debug!(root = %root.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load one explicit file over the defaults; the environment still wins.
    pub fn load_from_file(path: &Path) -> Result<CoursegenConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config: CoursegenConfig = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(merge_policy::environment_source())
            .build()?
            .try_deserialize()?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// [`ConfigLoader::load`] followed by validation.
    pub fn load_validated(root: &Path) -> Result<CoursegenConfig, ApiError> {
        Self::load(root)?.validated()
    }
}
