//! Linear model heads.
//!
//! The exported bundle ships each head as a JSON weight matrix. A head
//! computes `y_i = w_i · x + b_i`, optionally squashed through a sigmoid
//! for score-shaped outputs. Deterministic, allocation-light, and good
//! enough to keep digest verification and the e2e suite honest without a
//! tensor runtime in the process.

use std::path::Path;

use serde::Deserialize;

use crate::engine::{ModelRuntime, RuntimeLoader};
use crate::errors::InferenceError;

#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    /// One weight row per output.
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,

    /// Apply `1 / (1 + e^-y)` to each output.
    #[serde(default)]
    pub sigmoid: bool,
}

impl LinearModel {
    pub fn from_json(raw: &str) -> Result<Self, InferenceError> {
        let model: LinearModel = serde_json::from_str(raw)?;
        if model.weights.len() != model.bias.len() {
            return Err(InferenceError::OutputShape {
                expected: model.weights.len(),
                got: model.bias.len(),
            });
        }
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}

impl ModelRuntime for LinearModel {
    fn infer(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        let mut out = Vec::with_capacity(self.weights.len());
        for (row, bias) in self.weights.iter().zip(&self.bias) {
            if row.len() != features.len() {
                return Err(InferenceError::FeatureShape {
                    expected: row.len(),
                    got: features.len(),
                });
            }
            let mut y: f64 = row.iter().zip(features).map(|(w, x)| w * x).sum();
            y += bias;
            if self.sigmoid {
                y = 1.0 / (1.0 + (-y).exp());
            }
            out.push(y);
        }
        Ok(out)
    }
}

/// Loads [`LinearModel`] artifacts.
pub struct LinearRuntimeLoader;

impl RuntimeLoader for LinearRuntimeLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn ModelRuntime>, InferenceError> {
        Ok(Box::new(LinearModel::load(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_head_evaluates_rows_independently() {
        let model = LinearModel::from_json(
            r#"{ "weights": [[1.0, 0.0], [0.0, 2.0]], "bias": [0.5, -1.0] }"#,
        )
        .unwrap();
        let out = model.infer(&[2.0, 3.0]).unwrap();
        assert_eq!(out, vec![2.5, 5.0]);
    }

    #[test]
    fn sigmoid_head_stays_in_unit_interval() {
        let model = LinearModel::from_json(
            r#"{ "weights": [[10.0]], "bias": [0.0], "sigmoid": true }"#,
        )
        .unwrap();
        let hi = model.infer(&[5.0]).unwrap()[0];
        let lo = model.infer(&[-5.0]).unwrap()[0];
        assert!(hi > 0.99 && hi <= 1.0);
        assert!(lo < 0.01 && lo >= 0.0);
    }

    #[test]
    fn shape_mismatches_are_rejected() {
        let model =
            LinearModel::from_json(r#"{ "weights": [[1.0, 1.0]], "bias": [0.0] }"#).unwrap();
        assert!(matches!(
            model.infer(&[1.0]),
            Err(InferenceError::FeatureShape { expected: 2, got: 1 })
        ));

        assert!(LinearModel::from_json(r#"{ "weights": [[1.0]], "bias": [0.0, 0.0] }"#).is_err());
    }
}
