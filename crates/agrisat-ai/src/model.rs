//! Black-box model interfaces.
//!
//! Both models are pure functions of their input and fixed weights, so
//! implementations take `&self` and must be safe to share between requests.

use ndarray::{Array2, ArrayView2};

use crate::error::Result;

/// Binary segmentation model over square single-channel patches.
pub trait TileClassifier: Send + Sync {
    /// Score every pixel of `tile`. The output must have the tile's shape;
    /// scores are sigmoid-like values in `[0, 1]`.
    fn predict(&self, tile: ArrayView2<'_, f32>) -> Result<Array2<f32>>;
}

/// Regression model from a scaled sequence to one scalar.
pub trait SequenceRegressor: Send + Sync {
    fn predict(&self, sequence: &[f32]) -> Result<f32>;
}
