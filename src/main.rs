use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fairval::core::log::init_logging;

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

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Value all portfolios and baskets against their peers
    Value,
    /// Value portfolio stocks only
    Stocks,
    /// Value baskets only
    Baskets,
    /// Show the peer multiples behind a ticker's valuation
    Peers {
        /// Target ticker, as configured under `peers`
        ticker: String,
    },
}

impl Commands {
    fn into_app_command(self) -> Option<fairval::AppCommand> {
        match self {
            Commands::Setup => None,
            Commands::Value => Some(fairval::AppCommand::Value),
            Commands::Stocks => Some(fairval::AppCommand::Stocks),
            Commands::Baskets => Some(fairval::AppCommand::Baskets),
            Commands::Peers { ticker } => Some(fairval::AppCommand::Peers(ticker)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command.map(Commands::into_app_command) {
        Some(None) => match cli.config_path.as_deref() {
            Some(path) => fairval::cli::setup::setup_at_path(path),
            None => fairval::cli::setup::setup(),
        },
        Some(Some(cmd)) => fairval::run_command(cmd, cli.config_path.as_deref()).await,
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
