//! Dense assembly of persisted market state. The external store keeps
//! calibrated parameters, return statistics and correlation pairs as rows
//! keyed by date and ticker; everything numerical downstream wants ordered
//! tickers and positionally indexed arrays, so the translation happens here
//! exactly once.

use std::collections::HashMap;

use chrono::NaiveDate;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::backtest::BacktestSlice;
use crate::mc::basket::Basket;
use crate::models::hyphyp::HypHyp;
use crate::models::model::Model;
use crate::utils::errors::{KikoError, Result};

/// Calibrated model parameters for one ticker on one date.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParameterRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub sigma: f64,
    pub alpha: f64,
    pub beta: f64,
    pub kappa: f64,
    pub rho: f64,
}

/// Mean log-return and fixing for one ticker on one date.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub mean: f64,
    pub fixing: f64,
}

/// One correlation pair, stored once per unordered pair with `x0 < x1`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CorrRow {
    pub date: NaiveDate,
    pub x0: String,
    pub x1: String,
    pub corr: f64,
}

/// Everything the pricer needs for one basket on one date, positionally
/// aligned with the sorted ticker list.
#[derive(Debug, Clone)]
pub struct BasketInputs {
    pub tickers: Vec<String>,
    pub models: Vec<Model>,
    pub means: Vec<f64>,
    pub fixings: Vec<f64>,
    pub spots: Vec<f64>,
    pub correlation: DMatrix<f64>,
}

impl BasketInputs {
    pub fn initial_ratios(&self) -> Vec<f64> {
        self.spots
            .iter()
            .zip(&self.fixings)
            .map(|(spot, fixing)| spot / fixing)
            .collect()
    }

    pub fn basket(&self) -> Result<Basket> {
        Basket::new(
            self.tickers
                .iter()
                .cloned()
                .zip(self.models.iter().copied())
                .collect(),
        )
    }
}

/// # MarketSnapshot
/// In-memory copy of the persisted market state.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    pub parameters: Vec<ParameterRow>,
    pub statistics: Vec<StatRow>,
    pub correlations: Vec<CorrRow>,
    #[serde(default)]
    pub latest_prices: HashMap<String, f64>,
}

impl MarketSnapshot {
    /// Distinct parameter dates, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.parameters.iter().map(|r| r.date).collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }

    fn model_at(&self, date: NaiveDate, ticker: &str) -> Result<Model> {
        let row = self
            .parameters
            .iter()
            .find(|r| r.date == date && r.ticker == ticker)
            .ok_or_else(|| {
                KikoError::MarketDataMissingErr(format!("no parameters for {} on {}", ticker, date))
            })?;
        let hyphyp = HypHyp::new(row.sigma, row.alpha, row.beta, row.kappa, row.rho)?;
        Ok(Model::HypHyp(hyphyp))
    }

    fn stat_at(&self, date: NaiveDate, ticker: &str) -> Result<&StatRow> {
        self.statistics
            .iter()
            .find(|r| r.date == date && r.ticker == ticker)
            .ok_or_else(|| {
                KikoError::MarketDataMissingErr(format!("no statistics for {} on {}", ticker, date))
            })
    }

    fn corr_at(&self, date: NaiveDate, x0: &str, x1: &str) -> Result<f64> {
        self.correlations
            .iter()
            .find(|r| {
                r.date == date
                    && ((r.x0 == x0 && r.x1 == x1) || (r.x0 == x1 && r.x1 == x0))
            })
            .map(|r| r.corr)
            .ok_or_else(|| {
                KikoError::MarketDataMissingErr(format!(
                    "no correlation for {}/{} on {}",
                    x0, x1, date
                ))
            })
    }

    fn correlation_matrix(&self, date: NaiveDate, tickers: &[String]) -> Result<DMatrix<f64>> {
        let n = tickers.len();
        let mut matrix = DMatrix::identity(n, n);
        for i in 0..n {
            for j in (i + 1)..n {
                let value = self.corr_at(date, &tickers[i], &tickers[j])?;
                matrix[(i, j)] = value;
                matrix[(j, i)] = value;
            }
        }
        Ok(matrix)
    }

    fn inputs_at(
        &self,
        date: NaiveDate,
        tickers: &[String],
        spot_of: impl Fn(&StatRow) -> Result<f64>,
    ) -> Result<BasketInputs> {
        let mut models = Vec::with_capacity(tickers.len());
        let mut means = Vec::with_capacity(tickers.len());
        let mut fixings = Vec::with_capacity(tickers.len());
        let mut spots = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            models.push(self.model_at(date, ticker)?);
            let stat = self.stat_at(date, ticker)?;
            means.push(stat.mean);
            fixings.push(stat.fixing);
            spots.push(spot_of(stat)?);
        }
        Ok(BasketInputs {
            tickers: tickers.to_vec(),
            models,
            means,
            fixings,
            spots,
            correlation: self.correlation_matrix(date, tickers)?,
        })
    }

    /// Inputs for pricing as of now: the latest stored parameter date, spots
    /// from the latest-price table.
    pub fn pricing_inputs(&self, tickers: &[String]) -> Result<BasketInputs> {
        let date = self.dates().pop().ok_or_else(|| {
            KikoError::MarketDataMissingErr("snapshot holds no parameter rows".to_string())
        })?;
        self.inputs_at(date, tickers, |stat| {
            self.latest_prices
                .get(&stat.ticker)
                .copied()
                .ok_or_else(|| {
                    KikoError::MarketDataMissingErr(format!(
                        "no latest price for {}",
                        stat.ticker
                    ))
                })
        })
    }

    /// One slice per stored date, ascending. The replayed trajectory starts
    /// at the fixing, so spots equal fixings and every initial ratio is one.
    pub fn backtest_slices(&self, tickers: &[String]) -> Result<Vec<BacktestSlice>> {
        let dates = self.dates();
        if dates.is_empty() {
            return Err(KikoError::MarketDataMissingErr(
                "snapshot holds no parameter rows".to_string(),
            ));
        }
        dates
            .into_iter()
            .map(|date| {
                let inputs = self.inputs_at(date, tickers, |stat| Ok(stat.fixing))?;
                Ok(BacktestSlice { date, inputs })
            })
            .collect()
    }
}
