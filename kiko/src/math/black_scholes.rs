//! Black-Scholes pricing with continuous dividend yield, plus the implied
//! volatility inversion used to turn listed option quotes into calibration
//! inputs. The model here is deliberately minimal: it only has to be good
//! enough to recover a volatility from a premium.

use argmin::core::{CostFunction, Error as ArgminError, Executor, State};
use argmin::solver::neldermead::NelderMead;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::utils::errors::{KikoError, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

/// European option premium under Black-Scholes with dividend yield `div_yield`
/// and continuously compounded rate `rate`.
pub fn price(
    option: OptionType,
    spot: f64,
    strike: f64,
    vol: f64,
    maturity: f64,
    div_yield: f64,
    rate: f64,
) -> f64 {
    let phi = Normal::new(0.0, 1.0).unwrap();
    let x = vol * maturity.sqrt();
    let d1 = ((spot / strike).ln() + (rate - div_yield + 0.5 * vol * vol) * maturity) / x;
    let d2 = d1 - x;
    match option {
        OptionType::Call => {
            spot * (-div_yield * maturity).exp() * phi.cdf(d1)
                - strike * (-rate * maturity).exp() * phi.cdf(d2)
        }
        OptionType::Put => {
            strike * (-rate * maturity).exp() * phi.cdf(-d2)
                - spot * (-div_yield * maturity).exp() * phi.cdf(-d1)
        }
    }
}

struct PremiumLoss {
    option: OptionType,
    premium: f64,
    spot: f64,
    strike: f64,
    maturity: f64,
    div_yield: f64,
    rate: f64,
}

impl CostFunction for PremiumLoss {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        // parameter is log-volatility so the search is unconstrained
        let vol = param[0].exp();
        let model = price(
            self.option,
            self.spot,
            self.strike,
            vol,
            self.maturity,
            self.div_yield,
            self.rate,
        );
        let loss = (self.premium - model).powi(2);
        if loss.is_finite() {
            Ok(loss)
        } else {
            Ok(f64::INFINITY)
        }
    }
}

/// Invert Black-Scholes for the volatility matching an observed premium by
/// Nelder-Mead on log-volatility, starting from 50%.
pub fn implied_vol(
    option: OptionType,
    premium: f64,
    strike: f64,
    spot: f64,
    maturity: f64,
    div_yield: f64,
    rate: f64,
) -> Result<f64> {
    if premium <= 0.0 || spot <= 0.0 || strike <= 0.0 || maturity <= 0.0 {
        return Err(KikoError::InvalidRequestErr(format!(
            "implied vol needs positive premium/spot/strike/maturity, got {}/{}/{}/{}",
            premium, spot, strike, maturity
        )));
    }
    let problem = PremiumLoss {
        option,
        premium,
        spot,
        strike,
        maturity,
        div_yield,
        rate,
    };
    let start = 0.5f64.ln();
    let solver = NelderMead::new(vec![vec![start], vec![start + 0.5]])
        .with_sd_tolerance(1e-14)
        .map_err(|e| KikoError::NumericalErr(e.to_string()))?;
    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(500))
        .run()
        .map_err(|e| KikoError::NumericalErr(e.to_string()))?;
    let best = res
        .state()
        .get_best_param()
        .ok_or_else(|| KikoError::NumericalErr("implied vol search had no iterate".to_string()))?;
    Ok(best[0].exp())
}
