use anyhow::anyhow;
use clap::Parser;

use watchreduce::Settings;
use watchreduce::cli::commands::{init, watch};
use watchreduce::cli::{Cli, Commands};

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    settings.map_err(|e| anyhow!("Configuration error: {e}"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Init must work before any settings file exists
    if let Commands::Init { force } = &cli.command {
        return init::run_init(&std::env::current_dir()?, *force);
    }

    let settings = load_settings(&cli)?;
    watchreduce::logging::init_with_config(&settings.logging);

    match &cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Config => init::run_config(&settings),
        Commands::Watch(args) => watch::run_watch(&settings, args),
    }
}
