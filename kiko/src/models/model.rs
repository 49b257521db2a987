use serde::{Deserialize, Serialize};

use crate::models::hyphyp::HypHyp;

/// Pricing model of a single underlying, as a closed set of variants so the
/// calibrator and the path step handle every model exhaustively. HypHyp is
/// the only member today.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    HypHyp(HypHyp),
}

impl Default for Model {
    fn default() -> Self {
        Model::HypHyp(HypHyp::default())
    }
}

impl Model {
    pub fn path(&self, init_ratio: f64, dt: &[f64], z1: &[f64], z2: &[f64]) -> Vec<f64> {
        match self {
            Model::HypHyp(m) => m.path(init_ratio, dt, z1, z2),
        }
    }

    pub fn ivol(&self, moneyness: f64, maturity: f64) -> f64 {
        match self {
            Model::HypHyp(m) => m.ivol(moneyness, maturity),
        }
    }

    pub fn transformed(&self) -> [f64; 5] {
        match self {
            Model::HypHyp(m) => m.transformed(),
        }
    }

    /// Rebuild the same model variant from unconstrained parameters.
    pub fn with_transformed(&self, p: &[f64; 5]) -> Model {
        match self {
            Model::HypHyp(_) => Model::HypHyp(HypHyp::from_transformed(p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_transformed_keeps_variant() {
        let model = Model::default();
        let p = model.transformed();
        let Model::HypHyp(inner) = model.with_transformed(&p);
        let Model::HypHyp(original) = model;
        assert!((inner.sigma - original.sigma).abs() < 1e-12);
        assert!((inner.kappa - original.kappa).abs() < 1e-12);
    }

    #[test]
    fn test_serde_round_trip() {
        let model = Model::HypHyp(HypHyp::new(0.39, 0.32, 0.10, 18.55, -0.08).unwrap());
        let json = serde_json::to_string(&model).unwrap();
        let back: Model = serde_json::from_str(&json).unwrap();
        assert_eq!(model, back);
    }
}
