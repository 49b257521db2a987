//! Monte Carlo pricing and backtesting of worst-of autocallable Fixed Coupon
//! Notes on single-stock baskets, under a calibrated hyperbolic-hyperbolic
//! local-stochastic-volatility model.
//!
//! The crate is the numerical core only: paths, payoffs, calibration and
//! aggregation are pure functions of precomputed inputs. Market data
//! acquisition, persistence and any transport live outside and talk to the
//! core through the types in [`market`] and [`request`].

pub mod backtest;
pub mod market;
pub mod math;
pub mod mc;
pub mod models;
pub mod payoff;
pub mod prelude;
pub mod request;
pub mod stats;
pub mod time;
pub mod utils;
