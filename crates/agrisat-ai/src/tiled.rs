//! Tiled raster segmentation.
//!
//! The raster is clamped to `[0, 1]`, cut into non-overlapping square tiles
//! in row-major order, each tile is scored independently, and the thresholded
//! blocks are written back at their original offsets.

use std::time::Instant;

use agrisat_core::config::InferenceSettings;
use agrisat_core::{PredictionMask, RasterGrid};
use tracing::{debug, info};

use crate::error::{AiError, Result};
use crate::model::TileClassifier;

/// Result of a tiled run.
#[derive(Debug, Clone)]
pub struct MaskOutcome {
    pub mask: PredictionMask,
    pub tiles_processed: usize,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TiledInference {
    tile_size: usize,
    threshold: f32,
}

impl TiledInference {
    pub fn new(tile_size: usize, threshold: f32) -> Self {
        Self {
            tile_size,
            threshold,
        }
    }

    pub fn from_settings(settings: &InferenceSettings) -> Self {
        Self::new(settings.tile_size, settings.threshold)
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Segment `grid`. Fails before any tile is scored if the raster is not
    /// an exact multiple of the tile size.
    pub fn run(&self, grid: &RasterGrid, classifier: &dyn TileClassifier) -> Result<MaskOutcome> {
        let start = Instant::now();
        let tiling = grid.tiles(self.tile_size)?;
        let input = grid.clamped_unit();
        let (rows, cols) = grid.shape();
        let expected = self.tile_size * self.tile_size;

        let mut mask = PredictionMask::new(rows, cols);
        let mut tiles_processed = 0usize;

        for tile in tiling.iter() {
            let scores = classifier.predict(input.tile_view(&tile))?;
            if scores.dim() != (self.tile_size, self.tile_size) {
                return Err(AiError::OutputShape {
                    expected,
                    found: scores.len(),
                });
            }
            // Strictly greater: a score of exactly the threshold is negative.
            let block = scores.mapv(|s| s > self.threshold);
            mask.write_tile(&tile, block.view())?;
            tiles_processed += 1;
            debug!(row = tile.row, col = tile.col, "scored tile");
        }

        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            rows,
            cols,
            tiles = tiles_processed,
            positive = mask.count_true(),
            elapsed_secs,
            "tiled segmentation complete"
        );
        Ok(MaskOutcome {
            mask,
            tiles_processed,
            elapsed_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use agrisat_core::CoreError;
    use ndarray::{Array2, ArrayView2};

    /// Scores every pixel with a constant and counts calls.
    struct Constant {
        score: f32,
        calls: AtomicUsize,
    }

    impl Constant {
        fn new(score: f32) -> Self {
            Self {
                score,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TileClassifier for Constant {
        fn predict(&self, tile: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Array2::from_elem(tile.dim(), self.score))
        }
    }

    /// Echoes the (clamped) input as the score.
    struct Identity;

    impl TileClassifier for Identity {
        fn predict(&self, tile: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
            Ok(tile.to_owned())
        }
    }

    /// Scores a tile by its mean, so one pixel can flip the whole tile.
    struct TileMean;

    impl TileClassifier for TileMean {
        fn predict(&self, tile: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
            let mean = tile.mean().unwrap_or(0.0);
            Ok(Array2::from_elem(tile.dim(), mean))
        }
    }

    struct WrongShape;

    impl TileClassifier for WrongShape {
        fn predict(&self, _tile: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
            Ok(Array2::zeros((2, 2)))
        }
    }

    #[test]
    fn all_zero_raster_with_positive_classifier_is_all_true() {
        let grid = RasterGrid::zeros(256, 256);
        let classifier = Constant::new(0.6);
        let outcome = TiledInference::new(128, 0.5).run(&grid, &classifier).unwrap();

        assert_eq!(outcome.mask.shape(), (256, 256));
        assert!(outcome.mask.all());
        assert_eq!(outcome.tiles_processed, 4);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn non_multiple_shape_is_rejected_without_inference() {
        let grid = RasterGrid::zeros(256, 200);
        let classifier = Constant::new(0.9);
        let err = TiledInference::new(128, 0.5).run(&grid, &classifier).unwrap_err();

        assert!(err.is_shape_mismatch());
        assert!(matches!(
            err,
            AiError::Core(CoreError::ShapeMismatch { rows: 256, cols: 200, tile_size: 128, .. })
        ));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn threshold_is_strict() {
        let grid = RasterGrid::zeros(4, 4);
        let outcome = TiledInference::new(2, 0.5).run(&grid, &Constant::new(0.5)).unwrap();
        assert_eq!(outcome.mask.count_true(), 0);
    }

    #[test]
    fn input_is_clamped_before_scoring() {
        let grid = RasterGrid::from_vec(vec![-3.0, 0.4, 0.7, 9.0], 2, 2).unwrap();
        let outcome = TiledInference::new(2, 0.5).run(&grid, &Identity).unwrap();
        assert_eq!(outcome.mask.get(0, 0), Some(false));
        assert_eq!(outcome.mask.get(0, 1), Some(false));
        assert_eq!(outcome.mask.get(1, 0), Some(true));
        assert_eq!(outcome.mask.get(1, 1), Some(true));
    }

    #[test]
    fn tiles_are_independent() {
        let base = RasterGrid::filled(8, 8, 0.3);
        let mut changed = base.clone();
        // Push the top-left tile's mean above the threshold.
        for r in 0..4 {
            for c in 0..4 {
                changed.set(r, c, 1.0).unwrap();
            }
        }

        let runner = TiledInference::new(4, 0.5);
        let before = runner.run(&base, &TileMean).unwrap().mask;
        let after = runner.run(&changed, &TileMean).unwrap().mask;

        assert_eq!(before.count_true(), 0);
        for r in 0..8 {
            for c in 0..8 {
                let in_tile_a = r < 4 && c < 4;
                if in_tile_a {
                    assert_eq!(after.get(r, c), Some(true));
                } else {
                    assert_eq!(after.get(r, c), before.get(r, c), "cell ({r}, {c}) changed");
                }
            }
        }
    }

    #[test]
    fn wrong_output_shape_is_an_error() {
        let grid = RasterGrid::zeros(4, 4);
        let err = TiledInference::new(4, 0.5).run(&grid, &WrongShape).unwrap_err();
        assert!(matches!(err, AiError::OutputShape { expected: 16, found: 4 }));
    }

    proptest::proptest! {
        #[test]
        fn output_shape_matches_input(tr in 1usize..5, tc in 1usize..5, fill in -1.0f32..2.0) {
            let grid = RasterGrid::filled(tr * 8, tc * 8, fill);
            let outcome = TiledInference::new(8, 0.5).run(&grid, &Identity).unwrap();
            proptest::prop_assert_eq!(outcome.mask.shape(), grid.shape());
            proptest::prop_assert_eq!(outcome.tiles_processed, tr * tc);
        }

        #[test]
        fn misaligned_shapes_always_fail(rows in 1usize..40, cols in 1usize..40) {
            proptest::prop_assume!(rows % 8 != 0 || cols % 8 != 0);
            let grid = RasterGrid::zeros(rows, cols);
            let err = TiledInference::new(8, 0.5).run(&grid, &Identity).unwrap_err();
            proptest::prop_assert!(err.is_shape_mismatch());
        }
    }

    #[test]
    fn from_settings_uses_configured_values() {
        let settings = InferenceSettings {
            tile_size: 64,
            threshold: 0.7,
            ..Default::default()
        };
        let runner = TiledInference::from_settings(&settings);
        assert_eq!(runner.tile_size(), 64);
    }
}
