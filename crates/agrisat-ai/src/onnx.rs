//! ONNX Runtime model handles.
//!
//! The segmentation model takes a `[1, T, T, 1]` float tensor and returns
//! per-pixel scores of the same size. The yield model takes a `[1, N, 1]`
//! scaled NDVI sequence and returns a single value.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, ArrayView2};
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use crate::error::{AiError, Result};
use crate::model::{SequenceRegressor, TileClassifier};

/// Segmentation model loaded from an `.onnx` file.
///
/// `Session::run` needs exclusive access, so the session sits behind a mutex;
/// callers share the handle by reference.
pub struct OnnxTileClassifier {
    session: Mutex<Session>,
    tile_size: usize,
}

impl OnnxTileClassifier {
    /// Load a segmentation model. `tile_size` is used when the model's input
    /// shape has dynamic spatial dimensions.
    pub fn load(model_path: &Path, tile_size: usize) -> Result<Self> {
        let session = open_session(model_path)?;

        let declared = declared_tile_size(session.inputs().iter().map(|i| i.dtype()), model_path)?;
        if let Some(t) = declared
            && t != tile_size
        {
            return Err(AiError::unavailable(
                model_path,
                format!("model expects {t}px tiles but {tile_size}px are configured"),
            ));
        }

        info!(tile_size, model = %model_path.display(), "loaded segmentation model");
        Ok(Self {
            session: Mutex::new(session),
            tile_size,
        })
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }
}

impl TileClassifier for OnnxTileClassifier {
    fn predict(&self, tile: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let (rows, cols) = tile.dim();
        let pixels: Vec<f32> = tile.iter().copied().collect();
        let shape = [1i64, rows as i64, cols as i64, 1];
        let input = Tensor::from_array((shape, pixels.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AiError::Inference("segmentation session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![input])?;

        let (_, scores) = outputs[0].try_extract_tensor::<f32>()?;
        if scores.len() != rows * cols {
            return Err(AiError::OutputShape {
                expected: rows * cols,
                found: scores.len(),
            });
        }
        Array2::from_shape_vec((rows, cols), scores.to_vec())
            .map_err(|e| AiError::Inference(e.to_string()))
    }
}

/// Yield regression model loaded from an `.onnx` file.
pub struct OnnxSequenceRegressor {
    session: Mutex<Session>,
}

impl OnnxSequenceRegressor {
    pub fn load(model_path: &Path) -> Result<Self> {
        let session = open_session(model_path)?;
        info!(model = %model_path.display(), "loaded yield model");
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl SequenceRegressor for OnnxSequenceRegressor {
    fn predict(&self, sequence: &[f32]) -> Result<f32> {
        // Single-sequence batch: [batch, timesteps, features].
        let shape = [1i64, sequence.len() as i64, 1];
        let input = Tensor::from_array((shape, sequence.to_vec().into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AiError::Inference("yield session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![input])?;

        let (output_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = output_shape;
        match data {
            [value] => Ok(*value),
            _ => Err(AiError::Inference(format!(
                "expected a single output value, got shape {dims:?}"
            ))),
        }
    }
}

fn open_session(model_path: &Path) -> Result<Session> {
    if !model_path.exists() {
        return Err(AiError::unavailable(model_path, "file not found"));
    }
    let mut builder = Session::builder().map_err(|e| AiError::unavailable(model_path, e))?;
    builder
        .commit_from_file(model_path)
        .map_err(|e| AiError::unavailable(model_path, e))
}

/// Fixed tile size declared by the first model input, if any. A model
/// without inputs cannot be a segmentation model.
fn declared_tile_size<'a>(
    mut input_types: impl Iterator<Item = &'a ort::value::ValueType>,
    model_path: &Path,
) -> Result<Option<usize>> {
    let first = input_types
        .next()
        .ok_or_else(|| AiError::unavailable(model_path, "model declares no inputs"))?;
    Ok(infer_tile_size(first))
}

/// Try to read a fixed square tile size from the model input type.
fn infer_tile_size(input_type: &ort::value::ValueType) -> Option<usize> {
    match input_type {
        ort::value::ValueType::Tensor { shape, .. } => {
            // NHWC: [batch, height, width, channels].
            let dims: &[i64] = shape;
            match dims {
                [_, h, w, _] if *h > 0 && h == w => Some(*h as usize),
                _ => None,
            }
        }
        _ => None,
    }
}
