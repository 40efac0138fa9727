//! Adding remote imagery to an interactive map.
//!
//! The map widget belongs to the caller; this module only needs the three
//! operations in [`MapCanvas`].

use agrisat_core::config::DisplaySettings;
use agrisat_core::{Basemap, VisParams};
use tracing::info;

use crate::error::Result;
use crate::service::{ImageHandle, ImageryService, TileLayer};

pub trait MapCanvas {
    fn set_basemap(&mut self, basemap: Basemap);

    fn center(&mut self, lat: f64, lon: f64, zoom: u8);

    fn add_tile_layer(&mut self, name: &str, layer: &TileLayer, vis: &VisParams);
}

/// Ask the service for tiles of `handle` styled with `vis` and add them to
/// `map` under `name`.
pub async fn render_remote_layer(
    map: &mut dyn MapCanvas,
    service: &dyn ImageryService,
    handle: &ImageHandle,
    vis: &VisParams,
    name: &str,
) -> Result<TileLayer> {
    let layer = service.tile_layer(handle, vis).await?;
    map.add_tile_layer(name, &layer, vis);
    info!(layer = name, image = %handle.image_id, "added remote layer");
    Ok(layer)
}

/// A named layer as recorded by [`LayerList`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLayer {
    pub name: String,
    pub url_template: String,
    pub vis: VisParams,
}

/// Headless canvas that records what would be drawn. Used by the CLI to
/// print layer descriptions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerList {
    pub basemap: Basemap,
    pub center: Option<(f64, f64, u8)>,
    pub layers: Vec<PlacedLayer>,
}

impl LayerList {
    pub fn from_settings(display: &DisplaySettings) -> Self {
        Self {
            basemap: display.basemap,
            ..Default::default()
        }
    }
}

impl MapCanvas for LayerList {
    fn set_basemap(&mut self, basemap: Basemap) {
        self.basemap = basemap;
    }

    fn center(&mut self, lat: f64, lon: f64, zoom: u8) {
        self.center = Some((lat, lon, zoom));
    }

    fn add_tile_layer(&mut self, name: &str, layer: &TileLayer, vis: &VisParams) {
        self.layers.push(PlacedLayer {
            name: name.to_string(),
            url_template: layer.url_template.clone(),
            vis: vis.clone(),
        });
    }
}
