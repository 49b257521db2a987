use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::time::calendar::Calendar;
use crate::utils::errors::{KikoError, Result};

/// Universe of underlyings for which market data is maintained, in canonical
/// (sorted) order so positional indexing matches the correlation matrix.
pub const DEFAULT_STOCKS: [&str; 10] = [
    "AAPL", "AMZN", "AVGO", "GOOG", "INTC", "META", "MSFT", "NVDA", "QCOM", "TSLA",
];

pub const DEFAULT_TRIALS: usize = 10_000;
pub const DEFAULT_DISCOUNT_RATE: f64 = 0.03;

/// # Config
/// Runtime configuration of the pricing core, sourced from the environment:
/// `MC_TRIALS` (default 10000), `DISCOUNT_RATE` (default 0.03), `MASTER_SEED`
/// (optional, clock-derived when absent) and `CALENDAR` (default NYSE).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub trials: usize,
    pub discount_rate: f64,
    pub master_seed: Option<u64>,
    pub calendar: Calendar,
    pub universe: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            trials: DEFAULT_TRIALS,
            discount_rate: DEFAULT_DISCOUNT_RATE,
            master_seed: None,
            calendar: Calendar::Nyse,
            universe: DEFAULT_STOCKS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config> {
        let mut config = Config::default();
        if let Ok(v) = env::var("MC_TRIALS") {
            config.trials = v
                .parse()
                .map_err(|_| KikoError::InvalidRequestErr(format!("MC_TRIALS: {}", v)))?;
        }
        if let Ok(v) = env::var("DISCOUNT_RATE") {
            config.discount_rate = v
                .parse()
                .map_err(|_| KikoError::InvalidRequestErr(format!("DISCOUNT_RATE: {}", v)))?;
        }
        if let Ok(v) = env::var("MASTER_SEED") {
            let seed = v
                .parse()
                .map_err(|_| KikoError::InvalidRequestErr(format!("MASTER_SEED: {}", v)))?;
            config.master_seed = Some(seed);
        }
        if let Ok(v) = env::var("CALENDAR") {
            config.calendar = Calendar::from_name(&v)?;
        }
        Ok(config)
    }

    /// Explicit master seed, or one derived from the clock. Tests must set the
    /// seed explicitly to be reproducible.
    pub fn master_seed_or_clock(&self) -> u64 {
        match self.master_seed {
            Some(seed) => seed,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0),
        }
    }
}
