use serde::{Deserialize, Serialize};

use crate::utils::errors::{KikoError, Result};

/// # PricingRequest
/// Transport-agnostic description of a note to price. Field names follow the
/// external JSON contract; validation happens in [`PricingRequest::validate`]
/// before any numerical work starts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PricingRequest {
    pub stocks: Vec<String>,
    pub strike: f64,
    #[serde(default, rename = "autocall_coupon_rate")]
    pub autocall_coupon: f64,
    #[serde(default, rename = "barrier_coupon_rate")]
    pub barrier_coupon: f64,
    #[serde(default, rename = "fixed_coupon_rate")]
    pub fixed_coupon: f64,
    #[serde(rename = "knock_out_barrier")]
    pub knock_out: f64,
    #[serde(rename = "knock_in_barrier")]
    pub knock_in: f64,
    #[serde(rename = "coupon_barrier")]
    pub coupon_barrier: f64,
    pub maturity: u32,
    pub frequency: u32,
    #[serde(default, rename = "isEuro")]
    pub is_euro: bool,
}

fn is_ticker(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_uppercase())
}

impl PricingRequest {
    /// Check every field constraint and resolve the basket against the known
    /// universe. Returns the normalised (uppercased, deduplicated, sorted)
    /// ticker list.
    pub fn validate(&self, universe: &[String]) -> Result<Vec<String>> {
        if self.stocks.is_empty() {
            return Err(KikoError::InvalidRequestErr(
                "basket must not be empty".to_string(),
            ));
        }
        let mut stocks: Vec<String> = self.stocks.iter().map(|s| s.to_uppercase()).collect();
        stocks.sort_unstable();
        stocks.dedup();
        for s in &stocks {
            if !is_ticker(s) {
                return Err(KikoError::InvalidRequestErr(format!(
                    "ticker {:?} is not uppercase A-Z",
                    s
                )));
            }
            if !universe.contains(s) {
                return Err(KikoError::InvalidRequestErr(format!(
                    "unknown ticker {}",
                    s
                )));
            }
        }
        if !(self.strike > 0.0 && self.strike <= 1.0) {
            return Err(KikoError::InvalidRequestErr(format!(
                "strike must lie in (0, 1], got {}",
                self.strike
            )));
        }
        for (name, value) in [
            ("autocall_coupon_rate", self.autocall_coupon),
            ("barrier_coupon_rate", self.barrier_coupon),
            ("fixed_coupon_rate", self.fixed_coupon),
        ] {
            if value < 0.0 {
                return Err(KikoError::InvalidRequestErr(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        if self.knock_out < 1.0 {
            return Err(KikoError::InvalidRequestErr(format!(
                "knock_out_barrier must be at least 1, got {}",
                self.knock_out
            )));
        }
        if !(self.knock_in > 0.0 && self.knock_in <= 1.0) {
            return Err(KikoError::InvalidRequestErr(format!(
                "knock_in_barrier must lie in (0, 1], got {}",
                self.knock_in
            )));
        }
        if self.coupon_barrier < self.knock_in || self.coupon_barrier > self.knock_out {
            return Err(KikoError::InvalidRequestErr(format!(
                "coupon_barrier must lie in [{}, {}], got {}",
                self.knock_in, self.knock_out, self.coupon_barrier
            )));
        }
        if self.frequency == 0 {
            return Err(KikoError::InvalidRequestErr(
                "frequency must be a positive number of months".to_string(),
            ));
        }
        if self.maturity < self.frequency {
            return Err(KikoError::InvalidRequestErr(format!(
                "maturity {}m cannot be shorter than frequency {}m",
                self.maturity, self.frequency
            )));
        }
        Ok(stocks)
    }
}

/// Successful pricing response.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PriceResponse {
    pub price: f64,
}

/// Backtest summary over the historical strike dates.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BacktestReport {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub max_drawdown: f64,
}
