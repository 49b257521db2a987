#[allow(ambiguous_glob_reexports)]
pub use crate::{
    backtest::*,
    market::*,
    math::black_scholes::*,
    mc::{basket::*, engine::*, sampler::*},
    models::{calibration::*, hyphyp::*, model::*},
    payoff::fcn::*,
    request::*,
    stats::*,
    time::{calendar::*, daycounter::*, schedule::*},
    utils::{config::*, errors::*},
};
