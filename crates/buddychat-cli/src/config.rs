//! buddychat CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - built-in defaults
//! - a TOML file given with `--config`
//! - environment variables (`BUDDYCHAT_<SECTION>__<KEY>`, e.g.
//!   `BUDDYCHAT_PEER__LISTEN_PORT`)
//! - command line overrides (`--server`, `--listen-port`)
//!
//! The file uses the core's `[directory]`, `[presence]` and `[peer]`
//! sections plus a `[cli]` section for the interactive front end.

use std::path::Path;

use figment::{
    providers::{Data, Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use buddychat_core::{BuddyError, ClientConfig, DirectoryConfig, PeerConfig, PresenceConfig};

use crate::cli::Cli;

/// Prefix of environment variables read as configuration
const ENV_PREFIX: &str = "BUDDYCHAT_";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the buddychat CLI application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub directory: DirectoryConfig,
    pub presence: PresenceConfig,
    pub peer: PeerConfig,
    pub cli: CliConfig,
}

/// Interactive front end options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Text printed after the menu
    pub prompt: String,
    /// Lines of typed input buffered ahead of the menu or a chat
    pub input_buffer: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            prompt: "Your choice: ".to_string(),
            input_buffer: 16,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Resolve the effective configuration for a command line:
    /// CLI args > env vars > config file > defaults
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Self::file(path)?);
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        // Apply command line overrides
        if let Some(server) = &cli.server {
            figment = figment.merge(("directory.address", server));
        }
        if let Some(port) = cli.listen_port {
            figment = figment.merge(("peer.listen_port", port));
        }

        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Self::file(path)?)
            .extract()
            .map_err(|e| {
                ConfigError::Loading(format!("Failed to load from {}: {}", path.display(), e))
            })?;
        config.validate()?;
        Ok(config)
    }

    /// TOML provider for a file that must exist
    fn file<P: AsRef<Path>>(path: P) -> Result<Data<Toml>, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileSystem(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        Ok(Toml::file(path))
    }

    /// The network part, as the core expects it
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            directory: self.directory.clone(),
            presence: self.presence.clone(),
            peer: self.peer.clone(),
        }
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.client_config().validate().map_err(|e| match e {
            BuddyError::Configuration(reason) => ConfigError::Validation(reason),
            other => ConfigError::Validation(other.to_string()),
        })?;

        if self.cli.input_buffer == 0 {
            return Err(ConfigError::Validation(
                "Input buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
