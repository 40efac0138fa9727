//! End-to-end pipelines: NDVI series, yield, field mask, composite layer.
//!
//! Each pipeline takes its collaborators by reference so the binary can wire
//! real clients and tests can wire fakes.

use std::time::Instant;

use agrisat_ai::{MaskOutcome, ModelStore, TiledInference, YieldEstimate, YieldPredictor};
use agrisat_core::{AgrisatConfig, ImageryQuery, NdviSeries, RasterGrid};
use agrisat_remote::{
    CollectionFilter, ImageryService, LayerList, MapCanvas, RequestTracker, SeriesFetcher,
    TileLayer, render_remote_layer,
};
use anyhow::Context;

pub struct YieldReport {
    pub series: NdviSeries,
    pub estimate: YieldEstimate,
    pub elapsed_secs: f64,
}

/// Fetch the NDVI series for `query` with the configured collection and bands.
pub async fn fetch_series(
    service: &dyn ImageryService,
    config: &AgrisatConfig,
    query: &ImageryQuery,
) -> anyhow::Result<NdviSeries> {
    let fetcher = SeriesFetcher::new(
        service,
        &config.series,
        config.remote.max_concurrent_requests,
    );
    let series = fetcher.fetch(query).await.context("fetching NDVI series")?;
    Ok(series)
}

/// Fetch a series and run the yield model on it.
///
/// Returns `Ok(None)` when a newer request for `session` started while this
/// one was in flight.
pub async fn run_yield_pipeline(
    service: &dyn ImageryService,
    models: &ModelStore,
    config: &AgrisatConfig,
    query: &ImageryQuery,
    tracker: &RequestTracker,
    session: &str,
) -> anyhow::Result<Option<YieldReport>> {
    let start = Instant::now();
    let ticket = tracker.begin(session);

    let series = fetch_series(service, config, query).await?;
    series.ensure_usable(config.series.min_samples)?;

    let predictor = YieldPredictor::from_settings(&config.inference, config.series.min_samples);
    let estimate = predictor
        .predict_series(&series, models)
        .context("running yield model")?;

    let report = YieldReport {
        series,
        estimate,
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    Ok(tracker.accept(&ticket, report))
}

/// Yield from an externally supplied sequence (e.g. a CSV column).
pub fn run_yield_on_values(
    values: &[f64],
    models: &ModelStore,
    config: &AgrisatConfig,
) -> anyhow::Result<YieldEstimate> {
    let predictor = YieldPredictor::from_settings(&config.inference, config.series.min_samples);
    Ok(predictor.predict_values(values, models)?)
}

/// Segment a raster into a field mask with the configured tile size.
pub fn run_mask_pipeline(
    grid: &RasterGrid,
    models: &ModelStore,
    config: &AgrisatConfig,
) -> anyhow::Result<MaskOutcome> {
    let runner = TiledInference::from_settings(&config.inference);
    Ok(runner.run(grid, models.classifier())?)
}

/// Build the median NDVI composite for `query` and add it to `map`.
pub async fn run_layer_pipeline(
    map: &mut LayerList,
    service: &dyn ImageryService,
    config: &AgrisatConfig,
    query: &ImageryQuery,
    name: &str,
) -> anyhow::Result<TileLayer> {
    map.set_basemap(config.display.basemap);
    if let Some((lat, lon)) = query.region().center() {
        map.center(lat, lon, config.display.zoom);
    }

    let filter = CollectionFilter::from_settings(&config.series);
    let handle = service
        .composite(&filter, query, &config.series.index())
        .await
        .context("building composite")?;
    let layer = render_remote_layer(map, service, &handle, &config.display.vis, name)
        .await
        .context("requesting map tiles")?;
    Ok(layer)
}
