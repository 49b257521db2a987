use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kiko::prelude::*;

#[derive(Parser)]
#[command(
    name = "kiko",
    about = "Worst-of autocallable FCN pricer and backtester"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Price a note against a market snapshot
    Price {
        /// JSON file with the pricing request
        #[arg(long)]
        request: PathBuf,
        /// JSON file with the market snapshot
        #[arg(long)]
        snapshot: PathBuf,
        /// Strike date, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Override the number of Monte Carlo trials
        #[arg(long)]
        trials: Option<usize>,
        /// Override the master seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Roll the pricer through every strike date stored in the snapshot
    Backtest {
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        trials: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Fit model parameters to implied-vol quotes, or to raw option quotes
    /// inverted through Black-Scholes first
    Calibrate {
        /// JSON file of implied-vol quotes
        #[arg(long, conflicts_with = "options")]
        quotes: Option<PathBuf>,
        /// JSON file of raw option quotes
        #[arg(long)]
        options: Option<PathBuf>,
        /// Discount rate used when inverting option premiums
        #[arg(long, default_value_t = 0.03)]
        rate: f64,
    },
    /// Derive per-asset statistics and correlation rows from price histories
    Stats {
        /// JSON file of daily closing price histories
        #[arg(long)]
        prices: PathBuf,
        /// Reference date, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn load<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn mc_config(base: &Config, trials: Option<usize>, seed: Option<u64>) -> McConfig {
    let mut config = McConfig::from(base);
    if let Some(t) = trials {
        config.trials = t;
    }
    if let Some(s) = seed {
        config.master_seed = s;
    }
    config
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Price {
            request,
            snapshot,
            date,
            trials,
            seed,
        } => {
            let request: PricingRequest = load(&request)?;
            let snapshot: MarketSnapshot = load(&snapshot)?;
            let stocks = request.validate(&config.universe)?;
            let inputs = snapshot.pricing_inputs(&stocks)?;
            let strike_date = date.unwrap_or_else(|| Local::now().date_naive());
            let schedule = Schedule::generate(
                config.calendar,
                strike_date,
                request.maturity,
                request.frequency,
            )?;
            let contract = Fcn::from_request(&request, stocks);
            let engine = McEngine::new(
                inputs.basket()?,
                &inputs.means,
                &inputs.correlation,
                contract,
                schedule,
                mc_config(&config, trials, seed),
            )?;
            let result = engine.price(&inputs.initial_ratios())?;
            tracing::info!(
                std_error = result.std_error,
                completed = result.completed,
                failed = result.failed,
                "pricing finished"
            );
            println!(
                "{}",
                serde_json::to_string(&PriceResponse {
                    price: result.price
                })?
            );
        }
        Command::Backtest {
            request,
            snapshot,
            trials,
            seed,
        } => {
            let request: PricingRequest = load(&request)?;
            let snapshot: MarketSnapshot = load(&snapshot)?;
            let stocks = request.validate(&config.universe)?;
            let slices = snapshot.backtest_slices(&stocks)?;
            tracing::info!(dates = slices.len(), "running backtest");
            let report = kiko::backtest::run(
                &slices,
                &request,
                config.calendar,
                &mc_config(&config, trials, seed),
                &CancelToken::new(),
            )?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Calibrate {
            quotes,
            options,
            rate,
        } => {
            let vol_quotes: Vec<VolQuote> = match (quotes, options) {
                (Some(path), None) => load(&path)?,
                (None, Some(path)) => {
                    let raw: Vec<OptionQuote> = load(&path)?;
                    quotes_from_options(&raw, rate)
                }
                _ => anyhow::bail!("provide exactly one of --quotes or --options"),
            };
            let fitted = calibrate(Model::default(), &vol_quotes)?;
            println!("{}", serde_json::to_string(&fitted)?);
        }
        Command::Stats { prices, date } => {
            let histories: Vec<PriceHistory> = load(&prices)?;
            let today = date.unwrap_or_else(|| Local::now().date_naive());
            let stats = UniverseStatistics::compute(&histories, today)?;
            let (statistics, correlations) = stats.rows(today);
            println!(
                "{}",
                serde_json::to_string(&serde_json::json!({
                    "statistics": statistics,
                    "correlations": correlations,
                }))?
            );
        }
    }
    Ok(())
}
