use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::utils::errors::{KikoError, Result};

// Pivot below this magnitude is treated as a dependent column.
const PIVOT_TOL: f64 = 1e-10;
const RESIDUAL_TOL: f64 = 1e-6;

/// Lower-triangular Cholesky factor accepting positive *semi*-definite input.
/// A vanishing pivot (perfectly dependent assets, e.g. an all-ones matrix)
/// yields a zero column instead of a failure; a negative pivot or a non-zero
/// residual under a zero pivot means the matrix is not PSD.
fn psd_cholesky(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = m.nrows();
    if m.ncols() != n {
        return Err(KikoError::InvalidCorrelationErr(format!(
            "correlation matrix is {}x{}, expected square",
            m.nrows(),
            m.ncols()
        )));
    }
    for i in 0..n {
        for j in 0..i {
            if (m[(i, j)] - m[(j, i)]).abs() > RESIDUAL_TOL {
                return Err(KikoError::InvalidCorrelationErr(format!(
                    "correlation matrix is not symmetric at ({}, {})",
                    i, j
                )));
            }
        }
    }
    let mut l = DMatrix::zeros(n, n);
    for j in 0..n {
        let mut d = m[(j, j)];
        for k in 0..j {
            d -= l[(j, k)] * l[(j, k)];
        }
        if d < -PIVOT_TOL {
            return Err(KikoError::InvalidCorrelationErr(format!(
                "matrix is not positive semi-definite (pivot {} at column {})",
                d, j
            )));
        }
        if d <= PIVOT_TOL {
            for i in (j + 1)..n {
                let mut s = m[(i, j)];
                for k in 0..j {
                    s -= l[(i, k)] * l[(j, k)];
                }
                if s.abs() > RESIDUAL_TOL {
                    return Err(KikoError::InvalidCorrelationErr(format!(
                        "matrix is not positive semi-definite (residual {} under zero pivot {})",
                        s, j
                    )));
                }
            }
        } else {
            let root = d.sqrt();
            l[(j, j)] = root;
            for i in (j + 1)..n {
                let mut s = m[(i, j)];
                for k in 0..j {
                    s -= l[(i, k)] * l[(j, k)];
                }
                l[(i, j)] = s / root;
            }
        }
    }
    Ok(l)
}

/// # SamplerFactory
/// Holds the mean vector and the Cholesky factor of the asset correlation
/// matrix, computed once per pricing request. Construction fails with
/// `InvalidCorrelationErr` before any Monte Carlo worker starts; workers then
/// spawn one independently seeded [`CorrelatedSampler`] each.
#[derive(Debug, Clone)]
pub struct SamplerFactory {
    mu: Vec<f64>,
    lower: DMatrix<f64>,
}

impl SamplerFactory {
    pub fn new(mu: &[f64], correlation: &DMatrix<f64>) -> Result<SamplerFactory> {
        if mu.len() != correlation.nrows() {
            return Err(KikoError::InvalidCorrelationErr(format!(
                "mean vector has {} entries for a {}x{} correlation matrix",
                mu.len(),
                correlation.nrows(),
                correlation.ncols()
            )));
        }
        let lower = psd_cholesky(correlation)?;
        Ok(SamplerFactory {
            mu: mu.to_vec(),
            lower,
        })
    }

    pub fn dim(&self) -> usize {
        self.mu.len()
    }

    pub fn sampler(&self, seed: u64) -> CorrelatedSampler<'_> {
        CorrelatedSampler {
            factory: self,
            rng: StdRng::seed_from_u64(seed),
            xi: vec![0.0; self.mu.len()],
        }
    }
}

/// Per-trial source of the two noise streams: `z1` drawn from N(mu, corr) for
/// the asset innovations, `z2` independent standard normals for the latent
/// states. Owns its RNG; never shared across workers.
pub struct CorrelatedSampler<'a> {
    factory: &'a SamplerFactory,
    rng: StdRng,
    xi: Vec<f64>,
}

impl CorrelatedSampler<'_> {
    pub fn dim(&self) -> usize {
        self.factory.dim()
    }

    pub fn draw(&mut self, z1: &mut [f64], z2: &mut [f64]) {
        let n = self.factory.dim();
        debug_assert_eq!(z1.len(), n);
        debug_assert_eq!(z2.len(), n);
        for v in self.xi.iter_mut() {
            *v = self.rng.sample(StandardNormal);
        }
        for i in 0..n {
            let mut acc = self.factory.mu[i];
            for k in 0..=i {
                acc += self.factory.lower[(i, k)] * self.xi[k];
            }
            z1[i] = acc;
            z2[i] = self.rng.sample(StandardNormal);
        }
    }
}
