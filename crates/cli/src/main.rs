use anyhow::{Context, Result};
use auszug_core::Currency;
use auszug_storage::SqliteStore;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Paths;

#[derive(Parser, Debug)]
#[command(name = "auszug", version, about = "Import bank statements into a local SQLite ledger")]
struct Cli {
    /// Config file (default: config.toml in the data directory)
    #[arg(long, global = true, env = "AUSZUG_CONFIG")]
    config: Option<PathBuf>,

    /// Database file (default: auszug.db in the data directory)
    #[arg(long, global = true, env = "AUSZUG_DB")]
    db: Option<PathBuf>,

    /// Enables AI categorization; without it only keyword rules are used
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a CSV or PDF statement and print the outcome as JSON
    Ingest {
        file: PathBuf,

        /// Currency amounts are converted into (default from config)
        #[arg(long)]
        report_currency: Option<Currency>,

        /// Run every step but write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Maintain the EUR reference rate table
    Rates {
        #[command(subcommand)]
        command: RatesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum RatesCommand {
    /// Store a manual rate: 1 EUR = RATE × CURRENCY on DATE
    Set {
        date: NaiveDate,
        currency: Currency,
        rate: Decimal,
    },

    /// Fetch ECB reference rates for the lookback window ending at DATE
    Fetch { date: NaiveDate, currency: Currency },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("auszug=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = Paths::resolve(cli.config, cli.db)?;
    let config = commands::load_config(&paths.config, cli.openai_api_key)?;
    let store = SqliteStore::open(&paths.db)
        .await
        .with_context(|| format!("opening database {}", paths.db.display()))?;

    match cli.command {
        Command::Ingest {
            file,
            report_currency,
            dry_run,
        } => {
            let ingestor = commands::build_ingestor(config, &store).await?;
            let json = commands::ingest(&ingestor, &file, report_currency, dry_run).await?;
            println!("{json}");
        }

        Command::Rates { command } => match command {
            RatesCommand::Set {
                date,
                currency,
                rate,
            } => {
                let stored = commands::set_rate(&store, date, currency, rate).await?;
                println!("{}", serde_json::to_string_pretty(&stored)?);
            }
            RatesCommand::Fetch { date, currency } => {
                let source = commands::ecb_source(&config.fx)?;
                let rates = commands::fetch_rates(
                    &source,
                    &store,
                    date,
                    currency,
                    config.fx.lookback_days,
                )
                .await?;
                println!("{}", serde_json::to_string_pretty(&rates)?);
            }
        },
    }

    Ok(())
}
