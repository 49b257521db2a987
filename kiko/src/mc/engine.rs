use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use nalgebra::DMatrix;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::mc::basket::{worst_of, Basket};
use crate::mc::sampler::SamplerFactory;
use crate::payoff::fcn::Fcn;
use crate::time::schedule::Schedule;
use crate::utils::config::Config;
use crate::utils::errors::{KikoError, Result};

/// Monte Carlo driver settings. The master seed fully determines the result:
/// trial `i` draws from an RNG seeded with `mix_seed(master_seed, i)`, so the
/// outcome does not depend on the number of worker threads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct McConfig {
    pub trials: usize,
    pub master_seed: u64,
    pub discount_rate: f64,
}

impl Default for McConfig {
    fn default() -> Self {
        McConfig {
            trials: crate::utils::config::DEFAULT_TRIALS,
            master_seed: 0,
            discount_rate: crate::utils::config::DEFAULT_DISCOUNT_RATE,
        }
    }
}

impl From<&Config> for McConfig {
    fn from(config: &Config) -> Self {
        McConfig {
            trials: config.trials,
            master_seed: config.master_seed_or_clock(),
            discount_rate: config.discount_rate,
        }
    }
}

/// Cooperative cancellation flag, checked between trials.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Aggregated pricing result. `failed` counts trials degraded by NaN
/// propagation; `cancelled` is set when the token tripped or the deadline
/// passed before all trials ran, in which case `price` is the mean over the
/// completed ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct McResult {
    pub price: f64,
    pub std_error: f64,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: bool,
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Deterministic per-trial seed derived from the master seed.
pub(crate) fn mix_seed(master_seed: u64, trial: u64) -> u64 {
    splitmix64(master_seed ^ trial.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Online mean and variance, merged sequentially in trial order so equal
/// seeds reproduce bitwise equal aggregates regardless of thread count.
#[derive(Debug, Clone, Copy, Default)]
struct Welford {
    count: usize,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn std_error(&self) -> f64 {
        if self.count < 2 {
            return f64::NAN;
        }
        (self.m2 / (self.count - 1) as f64 / self.count as f64).sqrt()
    }
}

enum Trial {
    Payoff(f64),
    Failed,
    Skipped,
}

/// # McEngine
/// Prices one contract by plain Monte Carlo: fan out independent trials,
/// evaluate the discounted payoff of each simulated worst-of path, reduce
/// with Welford. Everything the workers touch is immutable; per-trial state
/// lives on the worker stack.
pub struct McEngine {
    basket: Basket,
    factory: SamplerFactory,
    contract: Fcn,
    schedule: Schedule,
    config: McConfig,
}

impl McEngine {
    pub fn new(
        basket: Basket,
        means: &[f64],
        correlation: &DMatrix<f64>,
        contract: Fcn,
        schedule: Schedule,
        config: McConfig,
    ) -> Result<McEngine> {
        if correlation.nrows() != basket.len() {
            return Err(KikoError::InvalidCorrelationErr(format!(
                "{}x{} correlation matrix for a basket of {}",
                correlation.nrows(),
                correlation.ncols(),
                basket.len()
            )));
        }
        if config.trials == 0 {
            return Err(KikoError::InvalidRequestErr(
                "trial count must be positive".to_string(),
            ));
        }
        let factory = SamplerFactory::new(means, correlation)?;
        Ok(McEngine {
            basket,
            factory,
            contract,
            schedule,
            config,
        })
    }

    pub fn config(&self) -> &McConfig {
        &self.config
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// One simulated discounted payoff, outside the trial loop. The
    /// backtester uses this to replay a single realised trajectory.
    pub fn single_path_payout(&self, initial_ratios: &[f64], seed: u64) -> Result<f64> {
        let dt = self.schedule.step_fractions();
        let mut sampler = self.factory.sampler(seed);
        let paths = self.basket.path(&dt, initial_ratios, &mut sampler)?;
        let wop = worst_of(&paths);
        Ok(self
            .contract
            .payout(&wop, &self.schedule, self.config.discount_rate))
    }

    pub fn price(&self, initial_ratios: &[f64]) -> Result<McResult> {
        self.price_with(initial_ratios, &CancelToken::new(), None)
    }

    pub fn price_with(
        &self,
        initial_ratios: &[f64],
        token: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<McResult> {
        if initial_ratios.len() != self.basket.len() {
            return Err(KikoError::InvalidRequestErr(format!(
                "{} initial ratios for a basket of {}",
                initial_ratios.len(),
                self.basket.len()
            )));
        }
        let dt = self.schedule.step_fractions();
        let trials: Vec<Trial> = (0..self.config.trials)
            .into_par_iter()
            .map(|i| {
                if token.is_cancelled() {
                    return Trial::Skipped;
                }
                if let Some(limit) = deadline {
                    if Instant::now() >= limit {
                        return Trial::Skipped;
                    }
                }
                let seed = mix_seed(self.config.master_seed, i as u64);
                let mut sampler = self.factory.sampler(seed);
                let paths = match self.basket.path(&dt, initial_ratios, &mut sampler) {
                    Ok(p) => p,
                    Err(_) => return Trial::Failed,
                };
                let wop = worst_of(&paths);
                let payoff = self
                    .contract
                    .payout(&wop, &self.schedule, self.config.discount_rate);
                if payoff.is_finite() {
                    Trial::Payoff(payoff)
                } else {
                    Trial::Failed
                }
            })
            .collect();

        let mut stats = Welford::default();
        let mut failed = 0usize;
        let mut skipped = 0usize;
        for trial in trials {
            match trial {
                Trial::Payoff(x) => stats.push(x),
                Trial::Failed => failed += 1,
                Trial::Skipped => skipped += 1,
            }
        }
        if stats.count == 0 {
            if skipped > 0 {
                return Err(KikoError::CancelledErr(
                    "cancelled before any trial completed".to_string(),
                ));
            }
            return Err(KikoError::NumericalErr(format!(
                "all {} trials produced NaN payoffs",
                self.config.trials
            )));
        }
        Ok(McResult {
            price: stats.mean,
            std_error: stats.std_error(),
            completed: stats.count,
            failed,
            cancelled: skipped > 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::models::hyphyp::HypHyp;
    use crate::models::model::Model;
    use crate::time::calendar::Calendar;
    use crate::time::daycounter::Actual365;

    use super::*;
    use chrono::NaiveDate;

    fn schedule() -> Schedule {
        let strike = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();
        Schedule::generate(Calendar::Nyse, strike, 12, 3).unwrap()
    }

    fn single_asset_basket() -> Basket {
        let model = Model::HypHyp(HypHyp::default());
        Basket::new(vec![("AAPL".to_string(), model)]).unwrap()
    }

    fn contract(knock_out: f64, knock_in: f64, is_euro: bool) -> Fcn {
        Fcn {
            tickers: vec!["AAPL".to_string()],
            strike: 0.8,
            autocall_coupon: 0.5,
            barrier_coupon: 0.0,
            fixed_coupon: 0.0,
            knock_out,
            knock_in,
            coupon_barrier: 0.8,
            maturity: 12,
            frequency: 3,
            is_euro_ki: is_euro,
        }
    }

    fn engine(contract: Fcn, trials: usize, master_seed: u64) -> McEngine {
        McEngine::new(
            single_asset_basket(),
            &[0.0],
            &DMatrix::identity(1, 1),
            contract,
            schedule(),
            McConfig {
                trials,
                master_seed,
                discount_rate: 0.03,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_deep_in_the_money_autocall_prices_in_closed_form() {
        // knock-out far below any attainable path forces autocall at the
        // first tick, so the price is deterministic
        let engine = engine(contract(0.01, 0.7, false), 10, 1);
        let result = engine.price(&[1.0]).unwrap();
        let schedule = schedule();
        let t = Actual365::year_fraction(schedule.obs_dates()[0], schedule.ko_dates()[0]);
        let expected = (-0.03 * t).exp() * (1.0 + 0.5 / 12.0);
        assert_eq!(result.completed, 10);
        assert_eq!(result.failed, 0);
        assert!(!result.cancelled);
        assert!((result.price - expected).abs() < 1e-6);
    }

    #[test]
    fn test_unreachable_barriers_price_the_discount_factor() {
        let mut fcn = contract(100.0, 0.0, true);
        fcn.autocall_coupon = 0.0;
        let engine = engine(fcn, 64, 2);
        let result = engine.price(&[1.0]).unwrap();
        let schedule = schedule();
        let t = Actual365::year_fraction(
            schedule.obs_dates()[0],
            *schedule.obs_dates().last().unwrap(),
        );
        assert!((result.price - (-0.03 * t).exp()).abs() < 1e-12);
        assert!(result.std_error.abs() < 1e-12);
    }

    #[test]
    fn test_same_master_seed_reproduces_bitwise() {
        let fcn = contract(100.0, 0.95, false);
        let a = engine(fcn.clone(), 2_000, 77).price(&[1.0]).unwrap();
        let b = engine(fcn.clone(), 2_000, 77).price(&[1.0]).unwrap();
        assert_eq!(a.price.to_bits(), b.price.to_bits());
        assert_eq!(a.std_error.to_bits(), b.std_error.to_bits());

        let c = engine(fcn, 2_000, 78).price(&[1.0]).unwrap();
        assert_ne!(a.price.to_bits(), c.price.to_bits());
    }

    #[test]
    fn test_standard_error_shrinks_with_trials() {
        let fcn = contract(100.0, 0.95, false);
        let small = engine(fcn.clone(), 400, 5).price(&[1.0]).unwrap();
        let large = engine(fcn, 6_400, 5).price(&[1.0]).unwrap();
        let ratio = small.std_error / large.std_error;
        // 16x the trials should shrink the error about 4x
        assert!(
            ratio > 2.5 && ratio < 6.5,
            "standard error ratio {} outside O(1/sqrt(M)) band",
            ratio
        );
    }

    #[test]
    fn test_pre_cancelled_token_reports_cancellation() {
        let engine = engine(contract(100.0, 0.7, false), 100, 9);
        let token = CancelToken::new();
        token.cancel();
        let err = engine.price_with(&[1.0], &token, None);
        assert!(matches!(err, Err(KikoError::CancelledErr(_))));
    }

    #[test]
    fn test_expired_deadline_reports_cancellation() {
        let engine = engine(contract(100.0, 0.7, false), 100, 9);
        let err = engine.price_with(&[1.0], &CancelToken::new(), Some(Instant::now()));
        assert!(matches!(err, Err(KikoError::CancelledErr(_))));
    }

    #[test]
    fn test_trial_seeds_are_spread() {
        let seeds: Vec<u64> = (0..64).map(|i| mix_seed(42, i)).collect();
        let mut unique = seeds.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), seeds.len());
    }

    #[test]
    fn test_welford_matches_direct_moments() {
        let xs = [1.0, 2.0, 4.0, 8.0, 16.0];
        let mut w = Welford::default();
        for x in xs {
            w.push(x);
        }
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        let var =
            xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
        assert!((w.mean - mean).abs() < 1e-12);
        assert!((w.std_error() - (var / xs.len() as f64).sqrt()).abs() < 1e-12);
    }
}
