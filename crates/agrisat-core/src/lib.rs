//! Core types for Agrisat: imagery queries, NDVI series, raster tiling, and configuration.

pub mod config;
pub mod error;
pub mod geometry;
pub mod ingest;
pub mod normalize;
pub mod query;
pub mod raster;
pub mod schema;
pub mod series;

pub use config::{AgrisatConfig, Basemap, Normalization, VisParams};
pub use error::{CoreError, Result};
pub use geometry::Region;
pub use normalize::{ScalerParams, min_max_normalize};
pub use query::{ImageryQuery, IndexSpec};
pub use raster::{PredictionMask, RasterGrid, Tile, TileGrid};
pub use series::{MIN_USABLE_SAMPLES, NdviSample, NdviSeries};
