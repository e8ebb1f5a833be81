use std::io;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use cu_cli::commands::{pipeline, preprocess, subset, summary};
use cu_cli::{Cli, Commands, Config};

/// Load config, apply command-line settings and reject invalid runs.
fn load_config(cli: &Cli, summarising: bool) -> Result<Config> {
    let config = Config::load_from(cli.config.as_deref())
        .context("failed to load configuration")?
        .with_settings(&cli.settings)
        .context("invalid --log-options")?;
    tracing::debug!(?config, "loaded configuration");

    config.validate(summarising)?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut stdout = io::stdout().lock();
    match &cli.command {
        Some(Commands::Preprocess(args)) => {
            let config = load_config(&cli, false)?;
            preprocess::run(&mut stdout, args, &config)?;
        }
        Some(Commands::Subset(args)) => {
            subset::run(&mut stdout, args)?;
        }
        Some(Commands::Summary(args)) => {
            let config = load_config(&cli, true)?;
            summary::run(&mut stdout, args, &config.summary_options()?)?;
        }
        Some(Commands::All(args)) => {
            let config = load_config(&cli, true)?;
            pipeline::run(&mut stdout, args, &config)?;
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
