use crate::mc::sampler::CorrelatedSampler;
use crate::models::model::Model;
use crate::utils::errors::{KikoError, Result};

/// # Basket
/// Ordered collection of underlyings and their calibrated models. Tickers are
/// kept sorted and unique so positional indices line up with the mean vector
/// and the correlation matrix everywhere downstream; map-shaped inputs are
/// normalised here once instead of being re-sorted at every call site.
#[derive(Debug, Clone, PartialEq)]
pub struct Basket {
    tickers: Vec<String>,
    models: Vec<Model>,
}

impl Basket {
    pub fn new(entries: Vec<(String, Model)>) -> Result<Basket> {
        if entries.is_empty() {
            return Err(KikoError::InvalidRequestErr(
                "basket must contain at least one underlying".to_string(),
            ));
        }
        let mut entries = entries;
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for pair in entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(KikoError::InvalidRequestErr(format!(
                    "duplicate underlying {} in basket",
                    pair[0].0
                )));
            }
        }
        let (tickers, models) = entries.into_iter().unzip();
        Ok(Basket { tickers, models })
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Simulate one correlated path per underlying over the time grid `dt`.
    /// The result is indexed `[asset][observation]`; row `i` has
    /// `dt.len() + 1` entries starting at `initial_ratios[i]`.
    pub fn path(
        &self,
        dt: &[f64],
        initial_ratios: &[f64],
        sampler: &mut CorrelatedSampler,
    ) -> Result<Vec<Vec<f64>>> {
        let n_assets = self.len();
        if initial_ratios.len() != n_assets {
            return Err(KikoError::InvalidRequestErr(format!(
                "{} initial ratios for a basket of {}",
                initial_ratios.len(),
                n_assets
            )));
        }
        if sampler.dim() != n_assets {
            return Err(KikoError::InvalidRequestErr(format!(
                "sampler dimension {} for a basket of {}",
                sampler.dim(),
                n_assets
            )));
        }
        let n_steps = dt.len();
        let mut z1 = vec![vec![0.0; n_steps]; n_assets];
        let mut z2 = vec![vec![0.0; n_steps]; n_assets];
        let mut step1 = vec![0.0; n_assets];
        let mut step2 = vec![0.0; n_assets];
        for k in 0..n_steps {
            sampler.draw(&mut step1, &mut step2);
            for i in 0..n_assets {
                z1[i][k] = step1[i];
                z2[i][k] = step2[i];
            }
        }
        let mut paths = Vec::with_capacity(n_assets);
        for i in 0..n_assets {
            paths.push(self.models[i].path(initial_ratios[i], dt, &z1[i], &z2[i]));
        }
        Ok(paths)
    }
}

/// Worst-of-performance series: the minimum across assets at each
/// observation.
pub fn worst_of(paths: &[Vec<f64>]) -> Vec<f64> {
    if paths.is_empty() {
        return Vec::new();
    }
    let len = paths.iter().map(|p| p.len()).min().unwrap_or(0);
    (0..len)
        .map(|k| {
            paths
                .iter()
                .map(|p| p[k])
                .fold(f64::INFINITY, |acc, v| acc.min(v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::mc::sampler::SamplerFactory;
    use crate::models::hyphyp::HypHyp;

    use super::*;
    use nalgebra::DMatrix;

    fn model() -> Model {
        Model::HypHyp(HypHyp::new(0.3, 0.2, 0.5, 2.0, -0.3).unwrap())
    }

    fn basket() -> Basket {
        Basket::new(vec![
            ("TSLA".to_string(), model()),
            ("AAPL".to_string(), model()),
        ])
        .unwrap()
    }

    #[test]
    fn test_tickers_are_sorted() {
        assert_eq!(basket().tickers(), &["AAPL".to_string(), "TSLA".to_string()]);
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(Basket::new(vec![]).is_err());
        assert!(Basket::new(vec![
            ("AAPL".to_string(), model()),
            ("AAPL".to_string(), model()),
        ])
        .is_err());
    }

    #[test]
    fn test_path_shape_and_initial_ratios() {
        let basket = basket();
        let factory = SamplerFactory::new(&[0.0, 0.0], &DMatrix::identity(2, 2)).unwrap();
        let mut sampler = factory.sampler(5);
        let dt = vec![1.0 / 252.0; 60];
        let paths = basket.path(&dt, &[0.9, 1.1], &mut sampler).unwrap();
        assert_eq!(paths.len(), 2);
        for (row, init) in paths.iter().zip([0.9, 1.1]) {
            assert_eq!(row.len(), 61);
            assert!((row[0] - init).abs() < 1e-15);
            assert!(row.iter().all(|&v| v > 0.0));
        }
    }

    #[test]
    fn test_path_rejects_mismatched_inputs() {
        let basket = basket();
        let factory = SamplerFactory::new(&[0.0, 0.0], &DMatrix::identity(2, 2)).unwrap();
        let mut sampler = factory.sampler(5);
        assert!(basket.path(&[0.01], &[1.0], &mut sampler).is_err());

        let factory3 = SamplerFactory::new(&[0.0; 3], &DMatrix::identity(3, 3)).unwrap();
        let mut sampler3 = factory3.sampler(5);
        assert!(basket.path(&[0.01], &[1.0, 1.0], &mut sampler3).is_err());
    }

    #[test]
    fn test_worst_of() {
        let paths = vec![vec![1.0, 0.8, 1.2], vec![0.9, 1.1, 1.0]];
        assert_eq!(worst_of(&paths), vec![0.9, 0.8, 1.0]);
        assert!(worst_of(&[]).is_empty());
    }
}
