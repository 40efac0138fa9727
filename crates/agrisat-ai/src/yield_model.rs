//! NDVI-sequence yield estimation.

use agrisat_core::config::InferenceSettings;
use agrisat_core::{CoreError, MIN_USABLE_SAMPLES, NdviSeries, Normalization, ScalerParams};
use tracing::{info, warn};

use crate::error::{AiError, Result};
use crate::store::ModelStore;

/// A single yield figure in the model's output units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldEstimate {
    pub value: f64,
    /// Number of NDVI samples the estimate was computed from.
    pub samples: usize,
    /// Scaling actually applied to the input.
    pub normalization: Normalization,
}

#[derive(Debug, Clone, Copy)]
pub struct YieldPredictor {
    min_samples: usize,
    normalization: Normalization,
}

impl Default for YieldPredictor {
    fn default() -> Self {
        Self::new(MIN_USABLE_SAMPLES, Normalization::PerCall)
    }
}

impl YieldPredictor {
    pub fn new(min_samples: usize, normalization: Normalization) -> Self {
        Self {
            min_samples,
            normalization,
        }
    }

    pub fn from_settings(settings: &InferenceSettings, min_samples: usize) -> Self {
        Self::new(min_samples, settings.normalization)
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Estimate yield from a fetched or uploaded series; timestamps are ignored.
    pub fn predict_series(
        &self,
        series: &NdviSeries,
        models: &ModelStore,
    ) -> Result<YieldEstimate> {
        self.predict_values(series.values(), models)
    }

    /// Estimate yield from a raw NDVI sequence.
    ///
    /// Sequences shorter than the minimum are rejected before scaling and the
    /// regressor is never called.
    pub fn predict_values(&self, values: &[f64], models: &ModelStore) -> Result<YieldEstimate> {
        let (input, normalization) = self.prepare(values, models.scaler())?;
        let raw = models.regressor().predict(&input)?;
        if !raw.is_finite() {
            return Err(AiError::Inference(format!("yield model produced {raw}")));
        }

        let estimate = YieldEstimate {
            value: f64::from(raw),
            samples: values.len(),
            normalization,
        };
        info!(
            value = estimate.value,
            samples = estimate.samples,
            normalization = normalization.as_str(),
            "yield estimated"
        );
        Ok(estimate)
    }

    /// Validate length and scale `values` into the model's input.
    pub fn prepare(
        &self,
        values: &[f64],
        persisted: Option<ScalerParams>,
    ) -> Result<(Vec<f32>, Normalization)> {
        if values.len() < self.min_samples {
            return Err(CoreError::InsufficientData {
                found: values.len(),
                required: self.min_samples,
            }
            .into());
        }

        let (scaler, mode) = match (self.normalization, persisted) {
            (Normalization::Persisted, Some(params)) => (params, Normalization::Persisted),
            (Normalization::Persisted, None) => {
                warn!(
                    "persisted scaler requested but none shipped with the model, fitting per call"
                );
                (ScalerParams::fit(values)?, Normalization::PerCall)
            }
            (Normalization::PerCall, _) => (ScalerParams::fit(values)?, Normalization::PerCall),
        };

        let scaled = scaler.transform_all(values).into_iter().map(|v| v as f32).collect();
        Ok((scaled, mode))
    }
}
