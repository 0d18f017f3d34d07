mod commands;
mod logging;
mod prompt;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flightbot")]
#[command(about = "Finds cheap flight destinations and mails the best deals", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore destinations, collect top deals and email the report
    Run(commands::run_cmd::RunArgs),

    /// Load and validate a config file
    Check {
        /// Config file (defaults to ~/.flightbot/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run environment diagnostics
    Doctor {
        /// Config file (defaults to ~/.flightbot/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            commands::run_cmd::run(args, cli.verbose).await?;
        }
        Commands::Check { config } => {
            logging::init_console(cli.verbose);
            commands::check::run(config)?;
        }
        Commands::Doctor { config } => {
            logging::init_console(cli.verbose);
            commands::doctor::run(config)?;
        }
    }

    Ok(())
}
