//! Raster grids, fixed-size tiling, and boolean prediction masks.

use ndarray::{Array2, ArrayView2, s};

use crate::error::{CoreError, Result};

/// Default tile edge used by the segmentation model.
pub const DEFAULT_TILE_SIZE: usize = 128;

/// A single-band 2-D raster of reflectance or index values.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    data: Array2<f32>,
}

impl RasterGrid {
    /// Create a raster filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::zeros((rows, cols)),
        }
    }

    /// Create a raster filled with `value`.
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), value),
        }
    }

    /// Create a raster from row-major data.
    pub fn from_vec(data: Vec<f32>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(CoreError::Other(format!(
                "{} values cannot fill a {rows}x{cols} raster",
                data.len()
            )));
        }
        let data = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| CoreError::Other(e.to_string()))?;
        Ok(Self { data })
    }

    pub fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.data.get((row, col)).copied()
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) -> Result<()> {
        let (rows, cols) = self.shape();
        let cell = self.data.get_mut((row, col)).ok_or_else(|| {
            CoreError::Other(format!("cell ({row}, {col}) outside {rows}x{cols} raster"))
        })?;
        *cell = value;
        Ok(())
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    /// Copy with every value clamped to `[0, 1]`; NaN (nodata) becomes 0.
    pub fn clamped_unit(&self) -> Self {
        Self {
            data: self
                .data
                .mapv(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }),
        }
    }

    /// Partition into non-overlapping `tile_size` squares.
    ///
    /// Both dimensions must be exact non-zero multiples of `tile_size`; the
    /// raster is never padded or cropped.
    pub fn tiles(&self, tile_size: usize) -> Result<TileGrid> {
        TileGrid::new(self.rows(), self.cols(), tile_size)
    }

    /// View of the cells covered by `tile`.
    pub fn tile_view(&self, tile: &Tile) -> ArrayView2<'_, f32> {
        self.data.slice(s![
            tile.row_offset..tile.row_offset + tile.size,
            tile.col_offset..tile.col_offset + tile.size
        ])
    }
}

/// A `size`×`size` block at grid position `(row, col)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub row: usize,
    pub col: usize,
    pub row_offset: usize,
    pub col_offset: usize,
    pub size: usize,
}

/// Regular tiling of a raster; iterates tiles in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    tile_rows: usize,
    tile_cols: usize,
    size: usize,
}

impl TileGrid {
    pub fn new(rows: usize, cols: usize, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(CoreError::Config("tile size must be positive".into()));
        }
        if rows == 0 || cols == 0 || rows % tile_size != 0 || cols % tile_size != 0 {
            return Err(CoreError::shape_mismatch(rows, cols, tile_size));
        }
        Ok(Self {
            tile_rows: rows / tile_size,
            tile_cols: cols / tile_size,
            size: tile_size,
        })
    }

    /// `(tile rows, tile cols)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.tile_rows, self.tile_cols)
    }

    pub fn len(&self) -> usize {
        self.tile_rows * self.tile_cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tile_size(&self) -> usize {
        self.size
    }

    pub fn iter(&self) -> impl Iterator<Item = Tile> + '_ {
        let size = self.size;
        (0..self.tile_rows).flat_map(move |row| {
            (0..self.tile_cols).map(move |col| Tile {
                row,
                col,
                row_offset: row * size,
                col_offset: col * size,
                size,
            })
        })
    }
}

/// Per-pixel boolean classification with the same shape as its source raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionMask {
    data: Array2<bool>,
}

impl PredictionMask {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), false),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<bool> {
        self.data.get((row, col)).copied()
    }

    pub fn view(&self) -> ArrayView2<'_, bool> {
        self.data.view()
    }

    /// Copy a tile-sized block into place.
    pub fn write_tile(&mut self, tile: &Tile, block: ArrayView2<'_, bool>) -> Result<()> {
        if block.dim() != (tile.size, tile.size) {
            return Err(CoreError::Other(format!(
                "block of shape {:?} does not fit a {}px tile",
                block.dim(),
                tile.size
            )));
        }
        self.data
            .slice_mut(s![
                tile.row_offset..tile.row_offset + tile.size,
                tile.col_offset..tile.col_offset + tile.size
            ])
            .assign(&block);
        Ok(())
    }

    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Fraction of cells set, in `[0, 1]`.
    pub fn coverage(&self) -> f64 {
        let total = self.data.len();
        if total == 0 {
            return 0.0;
        }
        self.count_true() as f64 / total as f64
    }

    pub fn all(&self) -> bool {
        self.data.iter().all(|&v| v)
    }
}
