//! Pipeline configuration.
//!
//! All dashboard variants share one parameterised pipeline; the knobs that
//! differed between them (collection, cloud threshold, buffer radius,
//! basemap, ...) live here. Loaded from TOML, every field has a default.
//!
//! ```toml
//! [remote]
//! base_url = "https://imagery.example.org"
//! max_retries = 3
//!
//! [series]
//! cloud_threshold = 10.0
//!
//! [display]
//! basemap = "satellite"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::query::IndexSpec;
use crate::raster::DEFAULT_TILE_SIZE;
use crate::series::MIN_USABLE_SAMPLES;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgrisatConfig {
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub series: SeriesSettings,
    #[serde(default)]
    pub inference: InferenceSettings,
    #[serde(default)]
    pub display: DisplaySettings,
}

/// Remote imagery service connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub base_url: String,
    /// Overrides the token endpoint named in the credential document.
    pub token_uri: Option<String>,
    /// Environment variable holding the service-account JSON.
    pub credentials_env: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Per-image region reductions in flight at once.
    pub max_concurrent_requests: usize,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8700".to_string(),
            token_uri: None,
            credentials_env: "AGRISAT_SERVICE_JSON".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 250,
            backoff_max_ms: 4_000,
            max_concurrent_requests: 8,
        }
    }
}

/// NDVI series extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesSettings {
    pub collection: String,
    pub nir_band: String,
    pub red_band: String,
    /// Image property holding the cloud-cover percentage.
    pub cloud_property: String,
    pub cloud_threshold: f64,
    /// Radius of the neighbourhood reduced around a query point, in metres.
    pub buffer_m: f64,
    /// Pixel scale of the reduction, in metres.
    pub scale_m: f64,
    pub min_samples: usize,
}

impl Default for SeriesSettings {
    fn default() -> Self {
        Self {
            collection: "COPERNICUS/S2_SR".to_string(),
            nir_band: "B8".to_string(),
            red_band: "B4".to_string(),
            cloud_property: "CLOUDY_PIXEL_PERCENTAGE".to_string(),
            cloud_threshold: 20.0,
            buffer_m: 50.0,
            scale_m: 10.0,
            min_samples: MIN_USABLE_SAMPLES,
        }
    }
}

impl SeriesSettings {
    pub fn index(&self) -> IndexSpec {
        IndexSpec::ndvi_from(&self.nir_band, &self.red_band)
    }
}

/// How yield-model inputs are scaled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Fit min/max on every input sequence.
    #[default]
    PerCall,
    /// Use the scaler shipped with the model; fall back to per-call if absent.
    Persisted,
}

impl Normalization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerCall => "per_call",
            Self::Persisted => "persisted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub model_dir: PathBuf,
    pub tile_size: usize,
    pub threshold: f32,
    pub normalization: Normalization,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            tile_size: DEFAULT_TILE_SIZE,
            threshold: 0.5,
            normalization: Normalization::PerCall,
        }
    }
}

/// Background map choice offered by the dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basemap {
    #[default]
    OpenStreetMap,
    Satellite,
    Terrain,
    Hybrid,
}

/// Visualisation parameters for a single-band layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    pub min: f64,
    pub max: f64,
    pub palette: Vec<String>,
}

impl Default for VisParams {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            palette: vec!["blue".into(), "white".into(), "green".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub basemap: Basemap,
    pub zoom: u8,
    pub vis: VisParams,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            basemap: Basemap::default(),
            zoom: 5,
            vis: VisParams::default(),
        }
    }
}

impl AgrisatConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CoreError::Config(format!("parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.inference.tile_size == 0 {
            return Err(CoreError::Config("inference.tile_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.inference.threshold) {
            return Err(CoreError::Config("inference.threshold must be within [0, 1]".into()));
        }
        if !(0.0..=100.0).contains(&self.series.cloud_threshold) {
            return Err(CoreError::Config("series.cloud_threshold must be a percentage".into()));
        }
        if self.series.buffer_m < 0.0 || self.series.scale_m <= 0.0 {
            return Err(CoreError::Config("series.buffer_m/scale_m must be positive".into()));
        }
        if self.remote.max_concurrent_requests == 0 {
            return Err(CoreError::Config(
                "remote.max_concurrent_requests must be positive".into(),
            ));
        }
        if self.display.vis.min >= self.display.vis.max {
            return Err(CoreError::Config("display.vis.min must be below max".into()));
        }
        Ok(())
    }
}
