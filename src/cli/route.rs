//! CLI route: single route table and run context.

use crate::cli::parse::{Commands, ConfigCommands};
use crate::cli::presentation::{format_classification_text, format_plan_text, ExecutionPlan};
use crate::config::{ConfigLoader, RelayConfig};
use crate::error::RelayError;
use crate::script::classifier::classify;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

/// Runtime context for CLI execution: workspace and the loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: RelayConfig,
}

impl RunContext {
    /// Load configuration from `config_path` if given, else from the workspace layers.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, RelayError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, RelayError> {
        match command {
            Commands::Classify { source } => {
                let source = read_source(source)?;
                Ok(format_classification_text(&classify(&source)))
            }
            Commands::Plan { source, format } => {
                let source = read_source(source)?;
                let plan = ExecutionPlan::build(&source, &self.config.injection);
                match format.as_str() {
                    "json" => serde_json::to_string_pretty(&plan)
                        .map_err(|e| RelayError::Execution(format!("Failed to encode plan: {}", e))),
                    "text" => Ok(format_plan_text(&plan)),
                    other => Err(invalid_format(other, "text or json")),
                }
            }
            Commands::Config { command } => self.handle_config_command(command),
        }
    }

    fn handle_config_command(&self, command: &ConfigCommands) -> Result<String, RelayError> {
        match command {
            ConfigCommands::Show { format } => match format.as_str() {
                "toml" => toml::to_string_pretty(&self.config)
                    .map_err(|e| RelayError::Config(format!("Failed to encode config: {}", e))),
                "json" => serde_json::to_string_pretty(&self.config)
                    .map_err(|e| RelayError::Config(format!("Failed to encode config: {}", e))),
                other => Err(invalid_format(other, "toml or json")),
            },
            ConfigCommands::Validate => {
                self.config.clone().validated()?;
                Ok("Configuration is valid".to_string())
            }
        }
    }
}

fn invalid_format(format: &str, expected: &str) -> RelayError {
    RelayError::InvalidPayload(format!("unknown format '{}' (expected {})", format, expected))
}

/// `-` reads the source from stdin.
fn read_source(arg: &str) -> Result<String, RelayError> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut source = String::new();
    std::io::stdin()
        .read_to_string(&mut source)
        .map_err(|e| RelayError::InvalidPayload(format!("Failed to read stdin: {}", e)))?;
    Ok(source)
}
