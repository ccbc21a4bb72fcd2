//! Tessel CLI - command-line interface for tessel texture graphs.

mod chain;
mod commands;
mod png;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tessel")]
#[command(author, version, about = "Tessel procedural texture CLI", long_about = None)]
struct Cli {
    /// Configuration file (default: ./tessel.toml, then the user config)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List node types or describe one
    Nodes(commands::nodes::NodesArgs),

    /// Print the evaluation order and baking plan of a chain
    Order(commands::order::OrderArgs),

    /// Bake a chain to PNG files
    Bake(commands::bake::BakeArgs),

    /// Print or write the configuration
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::common::load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Nodes(args) => commands::nodes::run(args),
        Commands::Order(args) => commands::order::run(args),
        Commands::Bake(args) => commands::bake::run(args, &config),
        Commands::Config(args) => commands::config::run(args, &config),
    }
}
