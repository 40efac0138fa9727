//! NDVI time-series extraction at a point.

use agrisat_core::config::SeriesSettings;
use agrisat_core::{ImageryQuery, IndexSpec, NdviSample, NdviSeries, Region};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::error::Result;
use crate::service::{CollectionFilter, ImageryService, ReduceRegionRequest};

/// Turns a point and date window into an [`NdviSeries`] using one remote
/// reduction per source image.
pub struct SeriesFetcher<'a> {
    service: &'a dyn ImageryService,
    filter: CollectionFilter,
    index: IndexSpec,
    buffer_m: f64,
    scale_m: f64,
    concurrency: usize,
}

impl<'a> SeriesFetcher<'a> {
    pub fn new(
        service: &'a dyn ImageryService,
        settings: &SeriesSettings,
        concurrency: usize,
    ) -> Self {
        Self {
            service,
            filter: CollectionFilter::from_settings(settings),
            index: settings.index(),
            buffer_m: settings.buffer_m,
            scale_m: settings.scale_m,
            concurrency: concurrency.max(1),
        }
    }

    /// Series for the point `(lat, lon)` over `[start, end)`.
    pub async fn fetch_point(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
        max_cloud_pct: f64,
    ) -> Result<NdviSeries> {
        let query = ImageryQuery::new(Region::point(lat, lon)?, start, end, max_cloud_pct)?;
        self.fetch(&query).await
    }

    /// Series for any query. Reductions run with bounded concurrency; results
    /// keep listing order before the series sorts them by time.
    pub async fn fetch(&self, query: &ImageryQuery) -> Result<NdviSeries> {
        let mut images = self.service.list_images(&self.filter, query).await?;
        let listed = images.len();

        // The listing filter is applied remotely; re-check it on the metadata
        // that came back. Images without a cloud estimate are kept.
        let threshold = query.cloud_threshold();
        images.retain(|image| match image.cloud_cover {
            Some(cover) if cover >= threshold => {
                debug!(image = %image.id, cover, threshold, "skipping cloudy image");
                false
            }
            _ => true,
        });

        let samples: Vec<NdviSample> = stream::iter(images)
            .map(|image| {
                let acquired_at = image.acquired_at;
                let request = ReduceRegionRequest::mean(
                    image.id,
                    self.index.clone(),
                    query.region().clone(),
                    self.buffer_m,
                    self.scale_m,
                );
                async move {
                    let value = self.service.reduce_region(&request).await?;
                    Ok::<_, crate::error::RemoteError>(NdviSample::new(acquired_at, value))
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let samples_len = samples.len();
        let series = NdviSeries::from_samples(samples);
        info!(
            collection = %self.filter.collection,
            listed,
            reduced = samples_len,
            usable = series.len(),
            "fetched NDVI series"
        );
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use agrisat_core::VisParams;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use crate::error::RemoteError;
    use crate::service::{ImageHandle, ImageMeta, TileLayer};

    /// In-memory service: each image id maps to a fixed reduction.
    struct FakeService {
        images: Vec<(ImageMeta, Option<f64>)>,
        fail_on: Option<&'static str>,
        reductions: AtomicUsize,
        seen_requests: Mutex<Vec<ReduceRegionRequest>>,
    }

    impl FakeService {
        fn new(values: &[Option<f64>]) -> Self {
            let images = values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let meta = ImageMeta {
                        id: format!("img-{i}"),
                        acquired_at: day(i as u32 + 1),
                        cloud_cover: Some(5.0),
                    };
                    (meta, *v)
                })
                .collect();
            Self {
                images,
                fail_on: None,
                reductions: AtomicUsize::new(0),
                seen_requests: Mutex::new(Vec::new()),
            }
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, d, 5, 0, 0).unwrap()
    }

    #[async_trait]
    impl ImageryService for FakeService {
        async fn list_images(
            &self,
            _filter: &CollectionFilter,
            _query: &ImageryQuery,
        ) -> Result<Vec<ImageMeta>> {
            Ok(self.images.iter().map(|(m, _)| m.clone()).collect())
        }

        async fn reduce_region(&self, request: &ReduceRegionRequest) -> Result<Option<f64>> {
            self.reductions.fetch_add(1, Ordering::SeqCst);
            self.seen_requests.lock().unwrap().push(request.clone());
            if self.fail_on == Some(request.image_id.as_str()) {
                return Err(RemoteError::Server {
                    status: 500,
                    body: "reduction failed".into(),
                });
            }
            Ok(self
                .images
                .iter()
                .find(|(m, _)| m.id == request.image_id)
                .and_then(|(_, v)| *v))
        }

        async fn composite(
            &self,
            _filter: &CollectionFilter,
            _query: &ImageryQuery,
            _index: &IndexSpec,
        ) -> Result<ImageHandle> {
            Ok(ImageHandle {
                image_id: "composite".into(),
            })
        }

        async fn tile_layer(&self, handle: &ImageHandle, _vis: &VisParams) -> Result<TileLayer> {
            Ok(TileLayer {
                url_template: format!("memory://{}/{{z}}/{{x}}/{{y}}", handle.image_id),
            })
        }
    }

    fn dates() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        )
    }

    #[tokio::test]
    async fn absent_reductions_are_dropped() {
        let service = FakeService::new(&[Some(0.2), Some(0.3), None, Some(0.5), Some(0.6)]);
        let fetcher = SeriesFetcher::new(&service, &SeriesSettings::default(), 2);
        let (start, end) = dates();
        let series = fetcher.fetch_point(10.0, 76.0, start, end, 20.0).await.unwrap();

        assert_eq!(series.len(), 4);
        assert_eq!(series.values(), &[0.2, 0.3, 0.5, 0.6]);
        assert!(!series.timestamps().contains(&day(3)));
        assert_eq!(service.reductions.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn reductions_use_configured_buffer_and_bands() {
        let service = FakeService::new(&[Some(0.4)]);
        let fetcher = SeriesFetcher::new(&service, &SeriesSettings::default(), 4);
        let (start, end) = dates();
        fetcher.fetch_point(10.0, 76.0, start, end, 20.0).await.unwrap();

        let seen = service.seen_requests.lock().unwrap();
        assert_eq!(seen[0].buffer_m, 50.0);
        assert_eq!(seen[0].scale_m, 10.0);
        assert_eq!(seen[0].index.positive_band, "B8");
        assert_eq!(seen[0].index.negative_band, "B4");
        assert_eq!(seen[0].reducer, "mean");
        assert_eq!(seen[0].region, Region::Point { lon: 76.0, lat: 10.0 });
    }

    #[tokio::test]
    async fn out_of_range_values_are_dropped() {
        let service = FakeService::new(&[Some(0.3), Some(1.7), Some(f64::NAN), Some(-0.2)]);
        let fetcher = SeriesFetcher::new(&service, &SeriesSettings::default(), 1);
        let (start, end) = dates();
        let series = fetcher.fetch_point(10.0, 76.0, start, end, 20.0).await.unwrap();
        assert_eq!(series.values(), &[0.3, -0.2]);
    }

    #[tokio::test]
    async fn images_at_or_above_cloud_threshold_are_skipped() {
        let mut service = FakeService::new(&[Some(0.2), Some(0.3), Some(0.4), Some(0.5)]);
        service.images[1].0.cloud_cover = Some(20.0);
        service.images[2].0.cloud_cover = Some(63.5);
        service.images[3].0.cloud_cover = None;
        let fetcher = SeriesFetcher::new(&service, &SeriesSettings::default(), 2);
        let (start, end) = dates();
        let series = fetcher.fetch_point(10.0, 76.0, start, end, 20.0).await.unwrap();

        assert_eq!(series.values(), &[0.2, 0.5]);
        assert_eq!(service.reductions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn remote_failure_propagates() {
        let mut service = FakeService::new(&[Some(0.2), Some(0.3), Some(0.4)]);
        service.fail_on = Some("img-1");
        let fetcher = SeriesFetcher::new(&service, &SeriesSettings::default(), 3);
        let (start, end) = dates();
        let err = fetcher.fetch_point(10.0, 76.0, start, end, 20.0).await.unwrap_err();
        assert!(matches!(err, RemoteError::Server { status: 500, .. }));
    }

    #[tokio::test]
    async fn invalid_window_fails_before_listing() {
        let service = FakeService::new(&[Some(0.2)]);
        let fetcher = SeriesFetcher::new(&service, &SeriesSettings::default(), 1);
        let (start, end) = dates();
        let err = fetcher.fetch_point(10.0, 76.0, end, start, 20.0).await.unwrap_err();
        assert!(matches!(err, RemoteError::Core(_)));
        assert_eq!(service.reductions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_series_is_reported_by_caller_check() {
        let service = FakeService::new(&[Some(0.2); 9]);
        let fetcher = SeriesFetcher::new(&service, &SeriesSettings::default(), 4);
        let (start, end) = dates();
        let series = fetcher.fetch_point(10.0, 76.0, start, end, 20.0).await.unwrap();
        let err = series.ensure_usable(agrisat_core::MIN_USABLE_SAMPLES).unwrap_err();
        assert!(matches!(
            err,
            agrisat_core::CoreError::InsufficientData { found: 9, required: 10 }
        ));
    }
}
