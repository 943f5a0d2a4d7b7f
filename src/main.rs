use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use quotefx::core::log::init_logging;
use std::time::Duration;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for quotefx::AppCommand {
    fn from(cmd: Commands) -> quotefx::AppCommand {
        match cmd {
            Commands::Prices { symbols, json } => quotefx::AppCommand::Prices { symbols, json },
            Commands::Rate { currency } => quotefx::AppCommand::Rate { currency },
            Commands::Watch { symbols, every } => quotefx::AppCommand::Watch {
                symbols,
                every: Duration::from_secs(every),
            },
            Commands::ClearCache => quotefx::AppCommand::ClearCache,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show prices in the reporting currency
    Prices {
        /// Ticker symbols, space or comma separated
        #[arg(required = true, value_delimiter = ',')]
        symbols: Vec<String>,
        /// Print a JSON envelope instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show the exchange rate into the reporting currency
    Rate {
        /// ISO currency code, e.g. USD
        currency: String,
    },
    /// Refresh prices on an interval until interrupted
    Watch {
        #[arg(required = true, value_delimiter = ',')]
        symbols: Vec<String>,
        /// Seconds between refreshes
        #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(u64).range(1..))]
        every: u64,
    },
    /// Remove cached quotes and exchange rates
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => quotefx::cli::setup::setup(),
        Some(cmd) => quotefx::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
