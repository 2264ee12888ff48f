//! Configuration loader: assembles the layered sources into a [`RelayConfig`].

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::RelayConfig;
use crate::error::RelayError;
use config::{Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`RelayConfig`] from defaults, files, and the environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): merge-policy defaults, global config file,
    /// `<workspace>/config/config.toml`, `<workspace>/config/{TABRELAY_ENV}.toml`,
    /// `TABRELAY__SECTION__KEY` environment variables.
    pub fn load(workspace_root: &Path) -> Result<RelayConfig, RelayError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder.add_source(Self::environment()).build()?;

        let relay_config: RelayConfig = config.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(relay_config)
    }

    /// Load configuration from a single explicit file layered over the defaults.
    pub fn load_from_file(path: &Path) -> Result<RelayConfig, RelayError> {
        if !path.exists() {
            return Err(RelayError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let config = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()))
            .add_source(Self::environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Global config file location, if one can be determined.
    pub fn xdg_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    fn environment() -> Environment {
        Environment::with_prefix("TABRELAY")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }
}
