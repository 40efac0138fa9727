//! Local inference layer: tiled field segmentation and NDVI-sequence yield
//! regression. ONNX Runtime handles are gated behind the `onnx` feature.

pub mod error;
pub mod model;
pub mod store;
pub mod tiled;
pub mod yield_model;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::{OnnxSequenceRegressor, OnnxTileClassifier};

pub use error::{AiError, Result};
pub use model::{SequenceRegressor, TileClassifier};
pub use store::ModelStore;
pub use tiled::{MaskOutcome, TiledInference};
pub use yield_model::{YieldEstimate, YieldPredictor};
