//! Swarmloop CLI, the main entry point.
//!
//! Commands:
//! - `run`     Run one turn of an agent against the built-in echo model
//! - `patch`   Propose live-config patches and read their statuses
//! - `config`  Show the resolved runtime configuration

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use swarmloop_config::AppConfig;

mod commands;
mod echo;

#[derive(Parser)]
#[command(
    name = "swarmloop",
    about = "Swarmloop: agent turn orchestration with live configuration",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ~/.swarmloop/config.toml)
    #[arg(short, long, global = true, env = "SWARMLOOP_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one turn and print its outcome
    Run(commands::run::RunArgs),

    /// Live-config patches
    Patch {
        #[command(subcommand)]
        command: commands::patch::PatchCommand,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the resolved configuration as TOML
    Show,
    /// Print the default configuration file path
    Path,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => AppConfig::load().context("Failed to load config"),
    }
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Run(args) => commands::run::run(config, args).await?,
        Commands::Patch { command } => commands::patch::run(config, command).await?,
        Commands::Config { command } => match command {
            ConfigCommand::Show => commands::config_cmd::show(&config)?,
            ConfigCommand::Path => commands::config_cmd::path(),
        },
    }

    Ok(())
}
