use crate::request::PricingRequest;
use crate::time::daycounter::Actual365;
use crate::time::schedule::Schedule;

/// Coupons accrue one twelfth of the annual rate per elapsed month.
pub const COUPON_FACTOR: f64 = 1.0 / 12.0;

/// Terminal state of a single trial. The three outcomes are disjoint and
/// exhaustive: either the note autocalls at some observation tick, or it runs
/// to maturity with or without a knock-in breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Autocalled { tick: usize },
    MaturedWithoutKnockIn,
    MaturedWithKnockIn,
}

/// # Fcn
/// Fixed Coupon Note contract terms. Barrier levels and the strike are
/// expressed as performance ratios against the fixing. Construction does not
/// re-validate; requests are checked once by
/// [`PricingRequest::validate`](crate::request::PricingRequest::validate).
#[derive(Debug, Clone, PartialEq)]
pub struct Fcn {
    pub tickers: Vec<String>,
    pub strike: f64,
    pub autocall_coupon: f64,
    pub barrier_coupon: f64,
    pub fixed_coupon: f64,
    pub knock_out: f64,
    pub knock_in: f64,
    pub coupon_barrier: f64,
    pub maturity: u32,
    pub frequency: u32,
    pub is_euro_ki: bool,
}

impl Fcn {
    pub fn from_request(request: &PricingRequest, tickers: Vec<String>) -> Fcn {
        Fcn {
            tickers,
            strike: request.strike,
            autocall_coupon: request.autocall_coupon,
            barrier_coupon: request.barrier_coupon,
            fixed_coupon: request.fixed_coupon,
            knock_out: request.knock_out,
            knock_in: request.knock_in,
            coupon_barrier: request.coupon_barrier,
            maturity: request.maturity,
            frequency: request.frequency,
            is_euro_ki: request.is_euro,
        }
    }

    /// Discounted payoff of one trial, see [`Fcn::settle`].
    pub fn payout(&self, wop: &[f64], schedule: &Schedule, rate: f64) -> f64 {
        self.settle(wop, schedule, rate).0
    }

    /// Walk the worst-of-performance series through the contract state
    /// machine and discount the redemption amount back to the first
    /// observation date at the continuously compounded `rate`.
    ///
    /// On every autocall date the fixed coupon is paid unconditionally and
    /// the barrier coupon when the worst-of closes above the coupon barrier.
    /// Autocall requires strictly exceeding the knock-out barrier; an exact
    /// touch does not redeem. A knock-in breach (any observation for American
    /// notes, the final one for European) adds a put-like loss on the final
    /// worst-of against the strike.
    pub fn settle(&self, wop: &[f64], schedule: &Schedule, rate: f64) -> (f64, Settlement) {
        let obs = schedule.obs_dates();
        let ko = schedule.ko_dates();
        let len = wop.len();
        if len == 0 || len != obs.len() {
            // malformed trial, reported as a NaN payoff at the trial boundary
            return (f64::NAN, Settlement::MaturedWithoutKnockIn);
        }
        let mut out = 1.0;
        let mut ko_idx = 0usize;
        let mut knocked_in = false;
        for i in 0..len {
            if ko_idx < ko.len() && obs[i] == ko[ko_idx] {
                out += COUPON_FACTOR * self.fixed_coupon;
                if wop[i] > self.coupon_barrier {
                    out += COUPON_FACTOR * self.barrier_coupon;
                }
                if wop[i] > self.knock_out {
                    out += (ko_idx as f64 + 1.0) * COUPON_FACTOR * self.autocall_coupon;
                    let t = Actual365::year_fraction(obs[0], obs[i]);
                    return ((-rate * t).exp() * out, Settlement::Autocalled { tick: ko_idx });
                }
                ko_idx += 1;
            }
            if !self.is_euro_ki && !knocked_in && wop[i] < self.knock_in {
                knocked_in = true;
            }
        }
        let last = wop[len - 1];
        let breached = knocked_in || (self.is_euro_ki && last < self.knock_in);
        if breached {
            out -= (self.strike - last).max(0.0) / self.strike;
        }
        let t = Actual365::year_fraction(obs[0], obs[len - 1]);
        let settlement = if breached {
            Settlement::MaturedWithKnockIn
        } else {
            Settlement::MaturedWithoutKnockIn
        };
        ((-rate * t).exp() * out, settlement)
    }
}
