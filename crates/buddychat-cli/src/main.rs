//! buddychat CLI entry point

use clap::Parser;
use tracing::info;

use buddychat_cli::{app::BuddyChatApp, cli::Cli, commands::Menu, config::AppConfig, input};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", AppConfig::example_config());
        return Ok(());
    }

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration
    let config = load_configuration(&cli)?;

    // Local input is read off the runtime
    let input = input::spawn_stdin_reader(config.cli.input_buffer);

    // Start presence and listener
    let mut app = BuddyChatApp::new(config);
    app.start().await;

    let mut menu = Menu::new(&app, input, std::io::stdout());
    let outcome = menu.run().await;
    drop(menu);

    println!("Shutting down...");
    app.shutdown().await;
    println!("Goodbye!");

    outcome?;
    Ok(())
}

/// Setup logging based on verbosity level. Logs go to stderr so they never
/// interleave with the chat transcript.
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file and command line overrides
fn load_configuration(cli: &Cli) -> anyhow::Result<AppConfig> {
    match &cli.config {
        Some(path) => info!("Loading configuration from: {}", path),
        None => info!("Using default configuration"),
    }
    Ok(AppConfig::load(cli)?)
}
