//! buddychat CLI library
//!
//! This library provides the components of the buddychat command-line
//! client: argument parsing, layered configuration, the local input task and
//! the interactive menu that drives the network core.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod input;

pub use app::BuddyChatApp;
pub use cli::Cli;
pub use commands::{Menu, MenuChoice};
pub use config::{AppConfig, CliConfig, ConfigError};
pub use error::{CliError, Result};
