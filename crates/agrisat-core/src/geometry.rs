//! Query geometries understood by the remote imagery service.
//!
//! A region is either a point, an axis-aligned lon/lat box, or a named polygon
//! looked up by the service in one of its feature collections (for example a
//! country from a boundary dataset).

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Feature collection used when a region is given by country name.
pub const COUNTRY_BOUNDARIES: &str = "USDOS/LSIB_SIMPLE/2017";
/// Property holding the country name in [`COUNTRY_BOUNDARIES`].
pub const COUNTRY_NAME_PROPERTY: &str = "country_na";

/// Spatial filter for an imagery query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Region {
    Point {
        lon: f64,
        lat: f64,
    },
    BoundingBox {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    },
    /// A polygon resolved remotely: the feature in `collection` whose
    /// `property` equals `value`.
    Named {
        collection: String,
        property: String,
        value: String,
    },
}

impl Region {
    /// A validated point.
    pub fn point(lat: f64, lon: f64) -> Result<Self> {
        check_lat(lat)?;
        check_lon(lon)?;
        Ok(Self::Point { lon, lat })
    }

    /// A validated lon/lat bounding box.
    pub fn bounding_box(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        check_lon(west)?;
        check_lon(east)?;
        check_lat(south)?;
        check_lat(north)?;
        if west >= east || south >= north {
            return Err(CoreError::InvalidRegion(format!(
                "degenerate bounding box [{west}, {south}, {east}, {north}]"
            )));
        }
        Ok(Self::BoundingBox {
            west,
            south,
            east,
            north,
        })
    }

    /// A country polygon from the default boundary collection.
    pub fn country(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidRegion("empty region name".into()));
        }
        Ok(Self::Named {
            collection: COUNTRY_BOUNDARIES.to_string(),
            property: COUNTRY_NAME_PROPERTY.to_string(),
            value: name.to_string(),
        })
    }

    /// Parse free-form user input: `"lat,lon"` becomes a point, anything else
    /// is treated as a country name.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if let Some((a, b)) = input.split_once(',')
            && let (Ok(lat), Ok(lon)) = (a.trim().parse::<f64>(), b.trim().parse::<f64>())
        {
            return Self::point(lat, lon);
        }
        Self::country(input)
    }

    /// Map centre for display, when the region has a local geometry.
    pub fn center(&self) -> Option<(f64, f64)> {
        match self {
            Self::Point { lon, lat } => Some((*lat, *lon)),
            Self::BoundingBox {
                west,
                south,
                east,
                north,
            } => Some(((south + north) / 2.0, (west + east) / 2.0)),
            Self::Named { .. } => None,
        }
    }
}

fn check_lat(lat: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(CoreError::InvalidRegion(format!(
            "latitude {lat} outside [-90, 90]"
        )));
    }
    Ok(())
}

fn check_lon(lon: f64) -> Result<()> {
    if !(-180.0..=180.0).contains(&lon) {
        return Err(CoreError::InvalidRegion(format!(
            "longitude {lon} outside [-180, 180]"
        )));
    }
    Ok(())
}
