//! address-screen: screen cryptocurrency addresses from a CSV file
//!
//! Usage:
//! ```bash
//! address-screen addresses.csv
//! address-screen addresses.csv results.csv --no-indirect
//! address-screen addresses.csv --rate-limit 2 --max-concurrent 4
//! ```
//!
//! The API key is read from `CHAINALYSIS_API_KEY` (environment or `.env`).

use address_screen::csv_io::default_output_path;
use address_screen::{screen_file, CategorySource, Config};
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Screen cryptocurrency addresses using the Chainalysis API
#[derive(Parser)]
#[command(name = "address-screen")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "The input CSV file must contain an 'address' column (see --address-column).\n\
                        Output defaults to <input>_screened.csv next to the input file.")]
struct Cli {
    /// Input CSV file containing cryptocurrency addresses
    input: PathBuf,

    /// Output CSV file for screening results
    output: Option<PathBuf>,

    /// Leave out indirect exposure columns
    #[arg(long)]
    no_indirect: bool,

    /// Maximum requests per second
    #[arg(long)]
    rate_limit: Option<u32>,

    /// Maximum requests in flight
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Input column holding the addresses
    #[arg(long)]
    address_column: Option<String>,

    /// Where exposure category columns come from
    #[arg(long, value_enum)]
    categories: Option<CategoryArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CategoryArg {
    Fixed,
    Remote,
}

impl From<CategoryArg> for CategorySource {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Fixed => CategorySource::Fixed,
            CategoryArg::Remote => CategorySource::Remote,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env().context("Failed to load configuration")?;

    if cli.no_indirect {
        config.include_indirect = false;
    }
    if let Some(rate) = cli.rate_limit {
        config.rate_limit = rate;
    }
    if let Some(max) = cli.max_concurrent {
        config.max_concurrent = max;
    }
    if let Some(column) = &cli.address_column {
        config.address_column = column.clone();
    }
    if let Some(source) = cli.categories {
        config.category_source = source.into();
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        bail!("Input file '{}' not found", cli.input.display());
    }
    let is_csv = cli
        .input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        bail!("Input file must be a CSV file");
    }

    let config = load_config(&cli)?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    info!(
        "Rate limit: {} req/s, Max concurrent: {}, Include indirect exposure: {}",
        config.rate_limit, config.max_concurrent, config.include_indirect
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Operation cancelled by user");
            on_signal.cancel();
        }
    });

    let summary = screen_file(&config, &cli.input, &output, &cancel).await?;

    info!(
        run_id = %summary.run_id,
        elapsed_ms = summary.elapsed().num_milliseconds(),
        "Screened {} addresses: {} successful, {} errors. Results written to {}",
        summary.total,
        summary.complete,
        summary.errors,
        output.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
