//! Remote imagery layer: service-account credentials, the HTTP imagery
//! client, NDVI series extraction, composite map layers and stale-request
//! tracking.

pub mod client;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod render;
pub mod service;
pub mod session;

pub use client::{ImageryClient, RetryPolicy};
pub use credentials::{DEFAULT_CREDENTIALS_ENV, ServiceAccountKey};
pub use error::{RemoteError, Result};
pub use fetcher::SeriesFetcher;
pub use render::{LayerList, MapCanvas, PlacedLayer, render_remote_layer};
pub use service::{CollectionFilter, ImageHandle, ImageMeta, ImageryService, TileLayer};
pub use session::{RequestTicket, RequestTracker};
