//! Imagery queries and band-math index definitions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::geometry::Region;

/// A filtered request against a remote image collection.
///
/// The date range is start-inclusive and end-exclusive. Images whose cloud
/// cover metadata is not strictly below `cloud_threshold` are excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageryQuery {
    region: Region,
    start: NaiveDate,
    end: NaiveDate,
    cloud_threshold: f64,
}

impl ImageryQuery {
    pub fn new(
        region: Region,
        start: NaiveDate,
        end: NaiveDate,
        cloud_threshold: f64,
    ) -> Result<Self> {
        if start >= end {
            return Err(CoreError::InvalidQuery(format!(
                "start date {start} must be before end date {end}"
            )));
        }
        if !(0.0..=100.0).contains(&cloud_threshold) {
            return Err(CoreError::InvalidQuery(format!(
                "cloud threshold {cloud_threshold} is not a percentage"
            )));
        }
        Ok(Self {
            region,
            start,
            end,
            cloud_threshold,
        })
    }

    /// Parse `YYYY-MM-DD` dates and build a query.
    pub fn from_strings(
        region: Region,
        start: &str,
        end: &str,
        cloud_threshold: f64,
    ) -> Result<Self> {
        Self::new(region, parse_date(start)?, parse_date(end)?, cloud_threshold)
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn cloud_threshold(&self) -> f64 {
        self.cloud_threshold
    }
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| CoreError::InvalidQuery(format!("bad date {s:?}: {e}")))
}

/// A normalized-difference band-math index, `(a - b) / (a + b)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub positive_band: String,
    pub negative_band: String,
    /// Name of the output band.
    pub name: String,
}

impl IndexSpec {
    /// NDVI over Sentinel-2 bands: NIR (`B8`) and red (`B4`).
    pub fn ndvi() -> Self {
        Self::ndvi_from("B8", "B4")
    }

    /// NDVI over arbitrary NIR/red band names.
    pub fn ndvi_from(nir: &str, red: &str) -> Self {
        Self {
            positive_band: nir.to_string(),
            negative_band: red.to_string(),
            name: "NDVI".to_string(),
        }
    }
}
