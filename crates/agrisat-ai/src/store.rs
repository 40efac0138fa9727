//! Process-lifetime holder for pretrained model handles.
//!
//! Built once at start-up and passed by reference into every inference call.
//! A missing or corrupt artifact fails here, never per request.

use std::path::Path;
use std::sync::Arc;

use agrisat_core::ScalerParams;
use tracing::info;

use crate::error::{AiError, Result};
use crate::model::{SequenceRegressor, TileClassifier};

/// File name of the segmentation model inside the model directory.
pub const SEGMENTATION_MODEL: &str = "segmentation.onnx";
/// File name of the yield model inside the model directory.
pub const YIELD_MODEL: &str = "yield.onnx";
/// Optional persisted scaler parameters for the yield model.
pub const YIELD_SCALER: &str = "yield_scaler.json";

#[derive(Clone)]
pub struct ModelStore {
    classifier: Arc<dyn TileClassifier>,
    regressor: Arc<dyn SequenceRegressor>,
    scaler: Option<ScalerParams>,
}

impl ModelStore {
    pub fn new(classifier: Arc<dyn TileClassifier>, regressor: Arc<dyn SequenceRegressor>) -> Self {
        Self {
            classifier,
            regressor,
            scaler: None,
        }
    }

    pub fn with_scaler(mut self, scaler: ScalerParams) -> Self {
        self.scaler = Some(scaler);
        self
    }

    /// Load both ONNX models (and the scaler, if present) from `model_dir`.
    #[cfg(feature = "onnx")]
    pub fn load(model_dir: &Path, tile_size: usize) -> Result<Self> {
        use crate::onnx::{OnnxSequenceRegressor, OnnxTileClassifier};

        let classifier = OnnxTileClassifier::load(&model_dir.join(SEGMENTATION_MODEL), tile_size)?;
        let regressor = OnnxSequenceRegressor::load(&model_dir.join(YIELD_MODEL))?;
        let scaler = Self::load_scaler(model_dir)?;

        info!(dir = %model_dir.display(), persisted_scaler = scaler.is_some(), "model store ready");
        Ok(Self {
            classifier: Arc::new(classifier),
            regressor: Arc::new(regressor),
            scaler,
        })
    }

    /// Read `yield_scaler.json` from `model_dir`. Absent file is not an error;
    /// an unreadable or invalid one is.
    pub fn load_scaler(model_dir: &Path) -> Result<Option<ScalerParams>> {
        let path = model_dir.join(YIELD_SCALER);
        if !path.exists() {
            return Ok(None);
        }
        let params =
            ScalerParams::from_json_file(&path).map_err(|e| AiError::unavailable(&path, e))?;
        info!(min = params.min, max = params.max, "loaded persisted yield scaler");
        Ok(Some(params))
    }

    pub fn classifier(&self) -> &dyn TileClassifier {
        self.classifier.as_ref()
    }

    pub fn regressor(&self) -> &dyn SequenceRegressor {
        self.regressor.as_ref()
    }

    pub fn scaler(&self) -> Option<ScalerParams> {
        self.scaler
    }
}
