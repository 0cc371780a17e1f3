//! CLI argument parsing using clap.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Watch a directory and run map/reduce cycles on every change
#[derive(Parser)]
#[command(
    name = "watchreduce",
    version,
    about = "Watch a directory and run map/reduce cycles on every change",
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .watchreduce directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    #[command(about = "Display active settings")]
    Config,

    /// Run the watch loop in the foreground
    #[command(about = "Watch the input directory and reduce its mirror on every change")]
    Watch(WatchArgs),
}

/// Overrides for the `[watch]` and `[reduce]` settings.
#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Directory to watch (overrides watch.input_path)
    #[arg(short, long, value_name = "DIR")]
    pub input: Option<PathBuf>,

    /// Directory the map stage writes to (overrides watch.output_path)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Reduce pool size (overrides reduce.threads)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// One event per distinct file instead of one per notification pair
    #[arg(long)]
    pub keyed: bool,

    /// Keep watching when the map stage fails
    #[arg(long)]
    pub isolate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch_overrides() {
        let cli = Cli::try_parse_from([
            "watchreduce",
            "watch",
            "--input",
            "in",
            "--threads",
            "2",
            "--keyed",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.input, Some(PathBuf::from("in")));
                assert_eq!(args.output, None);
                assert_eq!(args.threads, Some(2));
                assert!(args.keyed);
                assert!(!args.isolate);
            }
            _ => panic!("expected watch command"),
        }
    }
}
