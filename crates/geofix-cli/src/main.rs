use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use geofix_cli::commands::{events, export, info, stats, traces};
use geofix_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = match cli.verbose {
        0 => EnvFilter::from_default_env(),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests).
    // Diagnostics go to stderr so piped output stays clean.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config =
        Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    match &cli.command {
        Some(Commands::Info(args)) => {
            let mut stdout = std::io::stdout().lock();
            info::run(&mut stdout, args, &config)?;
        }
        Some(Commands::Events(args)) => {
            events::run(args, &config)?;
        }
        Some(Commands::Export(args)) => {
            export::run(args, &config)?;
        }
        Some(Commands::Traces(args)) => {
            let mut stdout = std::io::stdout().lock();
            traces::run(&mut stdout, args, &config)?;
        }
        Some(Commands::Stats(args)) => {
            let mut stdout = std::io::stdout().lock();
            stats::run(&mut stdout, args, &config)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
