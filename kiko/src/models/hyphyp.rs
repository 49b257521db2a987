use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::utils::errors::{KikoError, Result};

/// # HypHyp
/// Hyperbolic-hyperbolic local-stochastic-volatility model. The local
/// volatility is `f(x) * g(y) / x` with a hyperbolic skew term in the price
/// ratio `x` and an Ornstein-Uhlenbeck latent state `y` driving the
/// stochastic part. Parameters are immutable once calibrated.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct HypHyp {
    pub sigma: f64,
    pub alpha: f64,
    pub beta: f64,
    pub kappa: f64,
    pub rho: f64,
}

impl Default for HypHyp {
    /// Calibration starting point.
    fn default() -> Self {
        HypHyp {
            sigma: 0.40,
            alpha: 0.01,
            beta: 0.01,
            kappa: 5.0,
            rho: 0.0,
        }
    }
}

impl HypHyp {
    pub fn new(sigma: f64, alpha: f64, beta: f64, kappa: f64, rho: f64) -> Result<HypHyp> {
        if sigma <= 0.0 || alpha <= 0.0 || beta <= 0.0 || kappa <= 0.0 {
            return Err(KikoError::InvalidRequestErr(format!(
                "HypHyp parameters sigma/alpha/beta/kappa must be positive, got {}/{}/{}/{}",
                sigma, alpha, beta, kappa
            )));
        }
        if rho <= -1.0 || rho >= 1.0 {
            return Err(KikoError::InvalidRequestErr(format!(
                "HypHyp correlation must lie in (-1, 1), got {}",
                rho
            )));
        }
        Ok(HypHyp {
            sigma,
            alpha,
            beta,
            kappa,
            rho,
        })
    }

    /// Simulate one price path by Euler-Maruyama in log space over the time
    /// grid `dt`. `z1` drives the price (already correlated across assets by
    /// the caller), `z2` is an independent stream for the latent state; the
    /// model mixes them internally with `rho`. The returned path has
    /// `dt.len() + 1` strictly positive entries starting at `init_ratio`.
    pub fn path(&self, init_ratio: f64, dt: &[f64], z1: &[f64], z2: &[f64]) -> Vec<f64> {
        debug_assert_eq!(dt.len(), z1.len());
        debug_assert_eq!(dt.len(), z2.len());
        let n = dt.len();
        let mut r: Vec<f64> = vec![0.0; n + 1];
        let a = 0.5 * self.sigma * self.sigma;
        let b1 = self.beta;
        let b2 = b1 * b1;
        let rho_c = (1.0 - self.rho * self.rho).sqrt();
        let mut y: f64 = 0.0;
        for i in 0..n {
            let x = r[i].exp();
            let f = ((1.0 - b1 + b2) * x
                + (b1 - 1.0) * ((x * x + b2 * (1.0 - x) * (1.0 - x)).sqrt() - b1))
                / b1;
            let g = y + (y * y + 1.0).sqrt();
            let u = f * g / x;
            r[i + 1] = r[i] - a * dt[i] * u * u + u * dt[i].sqrt() * z1[i];
            let w = self.rho * z1[i] + rho_c * z2[i];
            y = y * (-self.kappa * dt[i]).exp()
                + self.alpha * (1.0 - (-2.0 * self.kappa * dt[i]).exp()).sqrt() * w;
        }
        r.into_iter().map(|v| init_ratio * v.exp()).collect()
    }

    /// Convenience single-asset path with internally drawn noise.
    pub fn sample_path(&self, init_ratio: f64, dt: &[f64], rng: &mut StdRng) -> Vec<f64> {
        let z1: Vec<f64> = (0..dt.len()).map(|_| rng.sample(StandardNormal)).collect();
        let z2: Vec<f64> = (0..dt.len()).map(|_| rng.sample(StandardNormal)).collect();
        self.path(init_ratio, dt, &z1, &z2)
    }

    /// Parameters mapped to the unconstrained domain for optimisation:
    /// log on the positive parameters, atanh on the correlation.
    pub fn transformed(&self) -> [f64; 5] {
        [
            self.sigma.ln(),
            self.alpha.ln(),
            self.beta.ln(),
            self.kappa.ln(),
            self.rho.atanh(),
        ]
    }

    /// Inverse of [`HypHyp::transformed`]. Index 3 is kappa, index 4 rho.
    pub fn from_transformed(p: &[f64; 5]) -> HypHyp {
        HypHyp {
            sigma: p[0].exp(),
            alpha: p[1].exp(),
            beta: p[2].exp(),
            kappa: p[3].exp(),
            rho: p[4].tanh(),
        }
    }

    /// Closed-form approximate implied volatility at moneyness `k` and
    /// maturity `t`: a Watanabe small-time expansion blended towards the
    /// Fouque at-the-money level. Used only during calibration.
    pub fn ivol(&self, k: f64, t: f64) -> f64 {
        let a = self.alpha * self.kappa * t;
        let h = (1.0 + a).sqrt() - a.sqrt();
        let v_watanabe = self.watanabe(k, t);
        let v_watanabe_atm = self.watanabe(1.0, t);
        let v_fouque_atm = self.fouque_atm(t);
        v_watanabe * ((1.0 - h) * v_fouque_atm / v_watanabe_atm + h)
    }

    fn fouque_atm(&self, t: f64) -> f64 {
        let u = self.kappa * t;
        let a = self.alpha * self.alpha;
        let s = (((-2.0 * u).exp() - 1.0) * a / u + 2.0 * a + 1.0).sqrt();
        self.sigma * s
            - (self.alpha * (a * a - 7.0 * a - 1.0) * self.rho * self.sigma * self.sigma)
                / (s * (2.0 * self.kappa).sqrt())
    }

    // Fourth-order Watanabe expansion. Reference algebra, kept term by term.
    fn watanabe(&self, k: f64, t: f64) -> f64 {
        let (a, b, s, r, h) = (self.alpha, self.beta, self.sigma, self.rho, self.kappa);
        let (a2, r2) = (a * a, r * r);
        let h1 = h.powf(1.5);
        let h2 = h * h;
        let u0 = h * t;
        let u02 = u0 * u0;
        let t2 = t * t;
        let t3 = t2 * t;
        let s2 = s * s;
        let (u, u1) = ((-u0).exp(), u0.exp());
        let uu = u * u;
        let u2 = u1 * u1;
        let st = t.sqrt();
        let b1 = b * (b - 1.0);
        let z = (k - 1.0) / (s * st);
        let z2 = z * z;
        let (f1, f2, f3, f4) = (b, b1, -3.0 * b1, -3.0 * b1 * (b * b - 4.0));
        let f12 = f1 * f1;
        let f13 = f12 * f1;
        let f22 = f2 * f2;
        let f44 = f4 * f4 * f4 * f4;

        let s1 = (z * s) / (2.0 * st)
            * ((f1 - 1.0) * s * t + 8.0f64.sqrt() * a * r * (u0 + u - 1.0) / (h1 * t));

        let s21 = 12.0 * 2.0f64.sqrt() * u1 * f1 * a * h1 * r * s * t2 * (u1 * (u0 - 1.0) + 1.0);
        let s22 = -u0
            * (u2 * (f12 - 2.0 * f2 - 1.0) * t3 * h2 * s2
                - 6.0 * a2
                    * r2
                    * (2.0 * u2 * u02 - 5.0 * u2 * u0 + u0 - 8.0 * u1 + 6.0 * u2 + 2.0));
        let s23 = (-6.0 * a2)
            * (2.0 * u2 * u02 * u0 * (r2 - 1.0)
                + u02 * (-9.0 * u2 * r2 + r2 + 5.0 * u2 - 1.0)
                - 2.0 * u0 * (u1 - 1.0) * (-7.0 * u1 * r2 + r2 + 3.0 * u1 - 1.0)
                - 4.0 * (u1 - 1.0) * (u1 - 1.0) * r2);
        let s24 = z2
            * (-12.0 * 2.0f64.sqrt() * u1 * a * h1 * r * s * t2 * (u1 * (u0 - 1.0) + 1.0)
                - u0 * (u2 * u02 * t * s2 * (2.0 * f12 + 6.0 * f1 - 4.0 * f2 - 8.0)
                    - 6.0 * a2 * r2 * (4.0 * u2 * u0 + 8.0 * u1 - 6.0 * u2 - 2.0))
                - 6.0 * a2
                    * (u02 * (12.0 * u2 * r2 - 4.0 * u2)
                        + 8.0 * (u1 - 1.0) * (u1 - 1.0) * r2
                        - 2.0 * (u1 - 1.0) * u0 * (11.0 * u1 * r2 - r2 - 3.0 * u1 + 1.0)));

        let s_2 = (s * uu) / (24.0 * u02 * u0) * (s21 + s22 + s23 + s24);

        let s_3 = (t.powf(1.5) * z * s2 * s2) / 48.0
            * (-f13 + f12 + (2.0 * f2 + 3.0) * f1 - 2.0 * f2 + 2.0 * f3 - 3.0
                + 2.0 * z2 * (f13 + f12 + (4.0 - 2.0 * f2) * f1 - 2.0 * f2 + f3 - 6.0));

        let s41 = 8.0 * z2 * z2
            * (19.0 * f12 * f12 + 15.0 * f13 + (20.0 - 46.0 * f2) * f12
                + 6.0 * (3.0 * f3 - 5.0 * f2 + 15.0) * f1
                - 40.0 * f2
                + 16.0 * f22
                + 15.0 * f3
                - 6.0 * f4
                - 144.0);
        let s42 = -2.0 * z2
            * (11.0 * f44 + 30.0 * f13 + (20.0 - 44.0 * f2) * f12
                + 6.0 * (12.0 * f3 - 10.0 * f2 - 45.0) * f1
                + 140.0 * f2
                + 44.0 * f22
                - 60.0 * f3
                + 36.0 * f4
                + 209.0);
        let s43 = -3.0
            * (3.0 * f12 * f12 - 2.0 * (6.0 * f2 + 5.0) * f12 + 16.0 * f3 * f1 + 12.0 * f22
                + 20.0 * f2
                + 8.0 * f4
                + 7.0);
        let s_4 = (-t2 * s2 * s2 * s) / 5760.0 * (s41 + s42 + s43);

        s + s1 + s_2 + s_3 + s_4
    }
}
