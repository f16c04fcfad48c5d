//! Fan-in worker
//!
//! Joins records that share a correlation id across several Kafka topics and
//! forwards the merged aggregate.

use clap::{Parser, Subcommand};
use colored::Colorize;
use fanin_cli::{
    commands::{CheckConfigCommand, RunCommand},
    load_config, logging,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fanin-worker",
    version,
    about = "Fan-in join worker for Kafka topics",
    long_about = "Consumes the input topics of a consumer profile, joins records that share \
                  an id and publishes the merged aggregate to the output topics."
)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        env = "FANIN_CONFIG",
        help = "Path to the worker configuration file"
    )]
    config: Option<PathBuf>,

    /// Consumer profile to run
    #[arg(
        long,
        global = true,
        value_name = "NAME",
        help = "Consumer name, overrides the configuration"
    )]
    consumer: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the worker
    #[command(name = "run", about = "Start the join workers")]
    Run(RunCommand),

    /// Validate configuration
    #[command(name = "check-config", about = "Load, validate and print the resolved profile")]
    CheckConfig(CheckConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.clone(), cli.consumer.as_deref())?;

    match cli.command {
        Commands::Run(command) => {
            logging::init_tracing(&config.observability, cli.verbose)?;
            command.execute(config).await?;
        }
        Commands::CheckConfig(command) => {
            command.execute(&config)?;
        }
    }

    Ok(())
}
