//! Min-max scaling of NDVI sequences.
//!
//! The yield model expects inputs scaled to `[0, 1]`. Parameters are either
//! fitted on the sequence being scored or loaded from a file shipped next to
//! the model weights, which keeps predictions comparable across calls.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Fitted parameters of a min-max scaler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub min: f64,
    pub max: f64,
}

impl ScalerParams {
    /// Fit on `values`. Fails on empty input or non-finite values.
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(CoreError::Other("cannot fit a scaler on an empty sequence".into()));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(CoreError::Other(format!("cannot fit a scaler on non-finite value {bad}")));
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(Self { min, max })
    }

    /// Scale one value. A zero-width range maps everything to 0.
    pub fn transform(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range <= f64::EPSILON {
            0.0
        } else {
            (value - self.min) / range
        }
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }

    /// Load persisted parameters, e.g. `yield_scaler.json`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&text)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        if !params.min.is_finite() || !params.max.is_finite() || params.min > params.max {
            return Err(CoreError::Config(format!(
                "{}: invalid scaler range [{}, {}]",
                path.display(),
                params.min,
                params.max
            )));
        }
        Ok(params)
    }
}

/// Fit on `values` and scale them in one step.
pub fn min_max_normalize(values: &[f64]) -> Result<Vec<f64>> {
    Ok(ScalerParams::fit(values)?.transform_all(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn increasing_sequence_maps_linearly() {
        let values: Vec<f64> = (0..12).map(|i| 0.1 + 0.4 * i as f64 / 11.0).collect();
        let scaled = min_max_normalize(&values).unwrap();
        assert_eq!(scaled.len(), 12);
        assert!(scaled[0].abs() < 1e-12);
        assert!((scaled[11] - 1.0).abs() < 1e-12);
        for (i, v) in scaled.iter().enumerate() {
            assert!((v - i as f64 / 11.0).abs() < 1e-9, "index {i}: {v}");
        }
    }

    #[test]
    fn constant_sequence_maps_to_zero() {
        let scaled = min_max_normalize(&[0.4; 5]).unwrap();
        assert!(scaled.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(min_max_normalize(&[]).is_err());
    }

    #[test]
    fn nan_is_rejected() {
        assert!(min_max_normalize(&[0.1, f64::NAN]).is_err());
    }

    #[test]
    fn persisted_params_do_not_refit() {
        let params = ScalerParams { min: 0.0, max: 1.0 };
        assert_eq!(params.transform_all(&[0.2, 0.4]), vec![0.2, 0.4]);
    }

    #[test]
    fn loads_params_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"min": -0.2, "max": 0.9}}"#).unwrap();
        let params = ScalerParams::from_json_file(file.path()).unwrap();
        assert_eq!(params, ScalerParams { min: -0.2, max: 0.9 });
    }

    #[test]
    fn rejects_inverted_persisted_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"min": 0.9, "max": 0.1}}"#).unwrap();
        assert!(matches!(
            ScalerParams::from_json_file(file.path()),
            Err(CoreError::Config(_))
        ));
    }

    proptest! {
        #[test]
        fn renormalizing_is_identity(values in prop::collection::vec(-1.0..1.0f64, 2..64)) {
            let once = min_max_normalize(&values).unwrap();
            let twice = min_max_normalize(&once).unwrap();
            for (a, b) in once.iter().zip(&twice) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }

        #[test]
        fn output_within_unit_range(values in prop::collection::vec(-1.0..1.0f64, 1..64)) {
            let scaled = min_max_normalize(&values).unwrap();
            prop_assert!(scaled.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }
}
