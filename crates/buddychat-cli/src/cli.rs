//! Command-line interface definitions and parsing

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Directory server address (overrides the config file)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Port buddies dial to reach this client; must be unique per host
    #[arg(short = 'p', long)]
    pub listen_port: Option<u16>,

    /// Print an example configuration file and exit
    #[arg(long)]
    pub print_config: bool,
}
