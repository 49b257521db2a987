use argmin::core::{CostFunction, Error as ArgminError, Executor, State};
use argmin::solver::neldermead::NelderMead;
use serde::{Deserialize, Serialize};

use crate::math::black_scholes::{self, OptionType};
use crate::models::model::Model;
use crate::utils::errors::{KikoError, Result};

const MAX_ITERS: u64 = 2_000;
const SD_TOLERANCE: f64 = 1e-10;
const SIMPLEX_STEP: f64 = 0.1;

/// One point of a market implied-volatility surface: moneyness (strike over
/// spot), maturity in years and the quoted vol.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct VolQuote {
    pub moneyness: f64,
    pub maturity: f64,
    pub vol: f64,
}

impl VolQuote {
    pub fn new(moneyness: f64, maturity: f64, vol: f64) -> Result<VolQuote> {
        if moneyness <= 0.0 || maturity <= 0.0 || vol <= 0.0 {
            return Err(KikoError::InvalidRequestErr(format!(
                "vol quote must be positive, got k={} T={} vol={}",
                moneyness, maturity, vol
            )));
        }
        Ok(VolQuote {
            moneyness,
            maturity,
            vol,
        })
    }
}

/// A listed option quote before inversion to implied vol.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OptionQuote {
    pub option: OptionType,
    pub strike: f64,
    pub underlying: f64,
    pub premium: f64,
    pub maturity: f64,
    #[serde(default)]
    pub div_yield: f64,
}

struct IvolMse<'a> {
    model: Model,
    quotes: &'a [VolQuote],
}

impl IvolMse<'_> {
    fn mse(&self, p: &[f64; 5]) -> f64 {
        let candidate = self.model.with_transformed(p);
        let mut loss = 0.0;
        for q in self.quotes {
            let v = candidate.ivol(q.moneyness, q.maturity);
            loss += (v - q.vol).powi(2);
        }
        loss / self.quotes.len() as f64
    }
}

impl CostFunction for IvolMse<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        let p = [param[0], param[1], param[2], param[3], param[4]];
        let loss = self.mse(&p);
        if loss.is_finite() {
            Ok(loss)
        } else {
            Ok(f64::INFINITY)
        }
    }
}

/// Fit a model to a set of vol quotes by Nelder-Mead on the transformed
/// parameter vector, minimising the mean squared implied-vol error. On
/// non-convergence the best point found so far is returned with a warning
/// rather than an error.
pub fn calibrate(model: Model, quotes: &[VolQuote]) -> Result<Model> {
    if quotes.is_empty() {
        return Err(KikoError::InvalidRequestErr(
            "calibration needs at least one vol quote".to_string(),
        ));
    }
    let x0 = model.transformed().to_vec();
    let mut simplex = vec![x0.clone()];
    for i in 0..x0.len() {
        let mut vertex = x0.clone();
        vertex[i] += SIMPLEX_STEP;
        simplex.push(vertex);
    }
    let problem = IvolMse { model, quotes };
    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(SD_TOLERANCE)
        .map_err(|e| KikoError::NumericalErr(e.to_string()))?;
    let run = Executor::new(problem, solver)
        .configure(|state| state.max_iters(MAX_ITERS))
        .run();
    match run {
        Ok(res) => {
            let state = res.state();
            if state.get_iter() >= MAX_ITERS {
                tracing::warn!(
                    iters = state.get_iter(),
                    best_cost = state.get_best_cost(),
                    "calibration stopped at iteration cap, keeping best point"
                );
            }
            let best = match state.get_best_param() {
                Some(p) => [p[0], p[1], p[2], p[3], p[4]],
                None => model.transformed(),
            };
            Ok(model.with_transformed(&best))
        }
        Err(e) => {
            tracing::warn!(error = %e, "calibration aborted, keeping starting point");
            Ok(model)
        }
    }
}

/// Turn raw option quotes into calibration inputs: out-of-the-money contracts
/// only, moneyness restricted to [0.5, 2.0], premium inverted to an implied
/// vol. Quotes failing those filters are dropped.
pub fn quotes_from_options(options: &[OptionQuote], rate: f64) -> Vec<VolQuote> {
    let mut out = Vec::new();
    for q in options {
        if q.premium <= 0.0 || q.underlying <= 0.0 || q.maturity <= 0.0 {
            continue;
        }
        let moneyness = q.strike / q.underlying;
        if !(0.5..=2.0).contains(&moneyness) {
            continue;
        }
        let in_the_money = match q.option {
            OptionType::Call => q.strike <= q.underlying,
            OptionType::Put => q.strike >= q.underlying,
        };
        if in_the_money {
            continue;
        }
        let vol = match black_scholes::implied_vol(
            q.option,
            q.premium,
            q.strike,
            q.underlying,
            q.maturity,
            q.div_yield,
            rate,
        ) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if let Ok(quote) = VolQuote::new(moneyness, q.maturity, vol) {
            out.push(quote);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::models::hyphyp::HypHyp;

    use super::*;

    fn surface(model: &Model) -> Vec<VolQuote> {
        let mut quotes = Vec::new();
        for k in [0.8, 0.9, 1.0, 1.1, 1.2] {
            for t in [0.25, 0.5, 1.0] {
                quotes.push(VolQuote::new(k, t, model.ivol(k, t)).unwrap());
            }
        }
        quotes
    }

    #[test]
    fn test_calibration_reduces_surface_error() {
        let truth = Model::HypHyp(HypHyp::new(0.25, 0.3, 0.2, 2.0, -0.5).unwrap());
        let quotes = surface(&truth);
        let start = Model::default();
        let fitted = calibrate(start, &quotes).unwrap();

        let mse = |m: &Model| {
            quotes
                .iter()
                .map(|q| (m.ivol(q.moneyness, q.maturity) - q.vol).powi(2))
                .sum::<f64>()
                / quotes.len() as f64
        };
        assert!(mse(&fitted) < mse(&start));
        assert!(mse(&fitted) < 1e-4, "residual mse {}", mse(&fitted));
    }

    #[test]
    fn test_calibration_rejects_empty_surface() {
        assert!(calibrate(Model::default(), &[]).is_err());
    }

    #[test]
    fn test_vol_quote_validation() {
        assert!(VolQuote::new(0.9, 1.0, 0.2).is_ok());
        assert!(VolQuote::new(0.0, 1.0, 0.2).is_err());
        assert!(VolQuote::new(0.9, -1.0, 0.2).is_err());
        assert!(VolQuote::new(0.9, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_quotes_from_options_filters_and_inverts() {
        let options = vec![
            // in the money call, dropped
            OptionQuote {
                option: OptionType::Call,
                strike: 90.0,
                underlying: 100.0,
                premium: 12.0,
                maturity: 0.5,
                div_yield: 0.0,
            },
            // moneyness above 2, dropped
            OptionQuote {
                option: OptionType::Call,
                strike: 250.0,
                underlying: 100.0,
                premium: 0.2,
                maturity: 0.5,
                div_yield: 0.0,
            },
            // viable OTM call
            OptionQuote {
                option: OptionType::Call,
                strike: 110.0,
                underlying: 100.0,
                premium: black_scholes::price(
                    OptionType::Call,
                    100.0,
                    110.0,
                    0.3,
                    0.5,
                    0.0,
                    0.03,
                ),
                maturity: 0.5,
                div_yield: 0.0,
            },
        ];
        let quotes = quotes_from_options(&options, 0.03);
        assert_eq!(quotes.len(), 1);
        assert!((quotes[0].moneyness - 1.1).abs() < 1e-12);
        assert!((quotes[0].vol - 0.3).abs() < 1e-3);
    }
}
