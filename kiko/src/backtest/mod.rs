//! Rolls the pricer and a realised-payoff replay through historical strike
//! dates and summarises the profit-and-loss series.

use chrono::NaiveDate;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use statrs::statistics::Statistics;

use crate::market::BasketInputs;
use crate::mc::engine::{mix_seed, CancelToken, McConfig, McEngine};
use crate::payoff::fcn::Fcn;
use crate::request::{BacktestReport, PricingRequest};
use crate::time::calendar::Calendar;
use crate::time::schedule::Schedule;
use crate::utils::errors::{KikoError, Result};

// Keeps the realised trajectory on a noise stream distinct from the pricing
// trials of the same master seed.
const REALISED_SALT: u64 = 0x5EED_0F0F_5EED_0F0F;

/// Market state as of one historical strike date.
#[derive(Debug, Clone)]
pub struct BacktestSlice {
    pub date: NaiveDate,
    pub inputs: BasketInputs,
}

/// Maximum drawdown of the cumulative growth series seeded at 1. Non-positive
/// by convention; 0 means the series never dipped below a running peak.
pub fn max_drawdown(pnl: &[f64]) -> f64 {
    let mut growth = 1.0;
    let mut peak = 1.0;
    let mut worst = 0.0f64;
    for p in pnl {
        growth *= 1.0 + p;
        worst = worst.min(growth / peak - 1.0);
        peak = peak.max(growth);
    }
    worst
}

fn report_from_pnl(pnl: &[f64]) -> BacktestReport {
    BacktestReport {
        mean: pnl.mean(),
        std: pnl.std_dev(),
        min: Statistics::min(pnl),
        max: Statistics::max(pnl),
        max_drawdown: max_drawdown(pnl),
    }
}

fn slice_pnl(
    slice: &BacktestSlice,
    index: usize,
    request: &PricingRequest,
    calendar: Calendar,
    config: &McConfig,
    token: &CancelToken,
) -> Result<f64> {
    let schedule = Schedule::generate(calendar, slice.date, request.maturity, request.frequency)?;
    let basket = slice.inputs.basket()?;
    let contract = Fcn::from_request(request, basket.tickers().to_vec());
    let engine = McEngine::new(
        basket,
        &slice.inputs.means,
        &slice.inputs.correlation,
        contract,
        schedule,
        *config,
    )?;
    let ratios = slice.inputs.initial_ratios();
    let priced = engine.price_with(&ratios, token, None)?;
    if priced.cancelled {
        return Err(KikoError::CancelledErr(format!(
            "backtest slice {} cancelled after {} trials",
            slice.date, priced.completed
        )));
    }
    let realised = engine.single_path_payout(
        &ratios,
        mix_seed(config.master_seed ^ REALISED_SALT, index as u64),
    )?;
    Ok(realised - priced.price)
}

/// Run the backtest over every slice in parallel. Any slice producing a NaN
/// profit fails the whole backtest with the offending dates listed;
/// cancellation aborts it as a whole.
pub fn run(
    slices: &[BacktestSlice],
    request: &PricingRequest,
    calendar: Calendar,
    config: &McConfig,
    token: &CancelToken,
) -> Result<BacktestReport> {
    if slices.is_empty() {
        return Err(KikoError::MarketDataMissingErr(
            "no historical dates to backtest".to_string(),
        ));
    }
    let outcomes: Vec<(NaiveDate, Result<f64>)> = slices
        .par_iter()
        .enumerate()
        .map(|(index, slice)| {
            (
                slice.date,
                slice_pnl(slice, index, request, calendar, config, token),
            )
        })
        .collect();

    let mut pnl = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (date, outcome) in outcomes {
        match outcome {
            Ok(value) if value.is_finite() => pnl.push(value),
            Ok(_) => failures.push(format!("{}", date)),
            Err(e @ KikoError::CancelledErr(_)) => return Err(e),
            Err(e) => failures.push(format!("{} ({})", date, e)),
        }
    }
    if !failures.is_empty() {
        return Err(KikoError::NumericalErr(format!(
            "backtest failed at {}",
            failures.join(", ")
        )));
    }
    Ok(report_from_pnl(&pnl))
}
