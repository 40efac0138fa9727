//! Remote imagery service interface and its JSON wire types.

use agrisat_core::config::SeriesSettings;
use agrisat_core::{ImageryQuery, IndexSpec, Region, VisParams};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Image collection plus the metadata property used for cloud filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionFilter {
    pub collection: String,
    pub cloud_property: String,
}

impl CollectionFilter {
    pub fn from_settings(settings: &SeriesSettings) -> Self {
        Self {
            collection: settings.collection.clone(),
            cloud_property: settings.cloud_property.clone(),
        }
    }
}

/// Listing entry for one source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub id: String,
    pub acquired_at: DateTime<Utc>,
    #[serde(default)]
    pub cloud_cover: Option<f64>,
}

/// Opaque reference to a server-side computed image (e.g. a composite).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    pub image_id: String,
}

/// Map tile source for a rendered image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileLayer {
    /// XYZ template, e.g. `https://.../tiles/{z}/{x}/{y}`.
    pub url_template: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListImagesRequest<'a> {
    pub collection: &'a str,
    pub region: &'a Region,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub cloud_property: &'a str,
    /// Exclusive upper bound on the cloud property.
    pub cloud_max: f64,
}

impl<'a> ListImagesRequest<'a> {
    pub fn new(filter: &'a CollectionFilter, query: &'a ImageryQuery) -> Self {
        Self {
            collection: &filter.collection,
            region: query.region(),
            start: query.start(),
            end: query.end(),
            cloud_property: &filter.cloud_property,
            cloud_max: query.cloud_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListImagesResponse {
    #[serde(default)]
    pub images: Vec<ImageMeta>,
}

/// Mean of a normalized-difference index over a buffered region of one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReduceRegionRequest {
    pub image_id: String,
    pub index: IndexSpec,
    pub region: Region,
    pub buffer_m: f64,
    pub scale_m: f64,
    pub reducer: &'static str,
}

impl ReduceRegionRequest {
    pub fn mean(
        image_id: impl Into<String>,
        index: IndexSpec,
        region: Region,
        buffer_m: f64,
        scale_m: f64,
    ) -> Self {
        Self {
            image_id: image_id.into(),
            index,
            region,
            buffer_m,
            scale_m,
            reducer: "mean",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReduceRegionResponse {
    #[serde(default)]
    pub value: Option<f64>,
}

/// Median composite of the filtered collection, clipped to the query region,
/// with the index band computed on it.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeRequest<'a> {
    #[serde(flatten)]
    pub images: ListImagesRequest<'a>,
    pub index: &'a IndexSpec,
    pub reducer: &'static str,
    pub clip: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TilesRequest<'a> {
    pub image_id: &'a str,
    pub vis: &'a VisParams,
}

/// Operations the pipelines need from a remote imagery service.
#[async_trait]
pub trait ImageryService: Send + Sync {
    /// Images in `filter.collection` matching `query`, in service order.
    async fn list_images(
        &self,
        filter: &CollectionFilter,
        query: &ImageryQuery,
    ) -> Result<Vec<ImageMeta>>;

    /// `None` when the region holds no valid pixels for the image.
    async fn reduce_region(&self, request: &ReduceRegionRequest) -> Result<Option<f64>>;

    async fn composite(
        &self,
        filter: &CollectionFilter,
        query: &ImageryQuery,
        index: &IndexSpec,
    ) -> Result<ImageHandle>;

    async fn tile_layer(&self, handle: &ImageHandle, vis: &VisParams) -> Result<TileLayer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_request_carries_query_window() {
        let filter = CollectionFilter::from_settings(&SeriesSettings::default());
        let region = Region::point(10.0, 76.0).unwrap();
        let query = ImageryQuery::from_strings(region, "2023-01-01", "2023-12-31", 20.0).unwrap();
        let json = serde_json::to_value(ListImagesRequest::new(&filter, &query)).unwrap();
        assert_eq!(json["collection"], "COPERNICUS/S2_SR");
        assert_eq!(json["cloud_property"], "CLOUDY_PIXEL_PERCENTAGE");
        assert_eq!(json["start"], "2023-01-01");
        assert_eq!(json["cloud_max"], 20.0);
        assert_eq!(json["region"]["type"], "point");
    }

    #[test]
    fn composite_request_flattens_listing_fields() {
        let filter = CollectionFilter::from_settings(&SeriesSettings::default());
        let region = Region::country("India").unwrap();
        let query = ImageryQuery::from_strings(region, "2022-01-01", "2023-01-01", 20.0).unwrap();
        let index = IndexSpec::ndvi();
        let request = CompositeRequest {
            images: ListImagesRequest::new(&filter, &query),
            index: &index,
            reducer: "median",
            clip: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["reducer"], "median");
        assert_eq!(json["region"]["value"], "India");
        assert_eq!(json["index"]["positive_band"], "B8");
    }

    #[test]
    fn null_reduction_is_absent() {
        let resp: ReduceRegionResponse = serde_json::from_str(r#"{"value": null}"#).unwrap();
        assert_eq!(resp.value, None);
        let resp: ReduceRegionResponse = serde_json::from_str(r#"{"value": 0.42}"#).unwrap();
        assert_eq!(resp.value, Some(0.42));
    }

    #[test]
    fn listing_parses_timestamps() {
        let resp: ListImagesResponse = serde_json::from_str(
            r#"{"images": [{"id": "S2A_1", "acquired_at": "2023-03-01T05:10:00Z", "cloud_cover": 4.5}]}"#,
        )
        .unwrap();
        assert_eq!(resp.images[0].id, "S2A_1");
        assert_eq!(resp.images[0].acquired_at.to_rfc3339(), "2023-03-01T05:10:00+00:00");
    }
}
