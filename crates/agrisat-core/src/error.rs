use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(
        "raster is {rows}x{cols} but both dimensions must be multiples of the \
         {tile_size}px tile size; crop or resample the input to e.g. \
         {suggested_rows}x{suggested_cols}"
    )]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        tile_size: usize,
        suggested_rows: usize,
        suggested_cols: usize,
    },

    #[error(
        "only {found} usable NDVI samples, at least {required} are needed; \
         try a different date range or location"
    )]
    InsufficientData { found: usize, required: usize },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("TIFF decode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Build a [`CoreError::ShapeMismatch`] with the largest conforming shape as guidance.
    pub fn shape_mismatch(rows: usize, cols: usize, tile_size: usize) -> Self {
        let t = tile_size.max(1);
        Self::ShapeMismatch {
            rows,
            cols,
            tile_size,
            suggested_rows: (rows / t).max(1) * t,
            suggested_cols: (cols / t).max(1) * t,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
