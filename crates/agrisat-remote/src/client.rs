//! HTTP implementation of [`ImageryService`].

use std::time::{Duration, Instant};

use agrisat_core::config::RemoteSettings;
use agrisat_core::{ImageryQuery, IndexSpec, VisParams};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::credentials::ServiceAccountKey;
use crate::error::{RemoteError, Result};
use crate::service::{
    CollectionFilter, CompositeRequest, ImageHandle, ImageMeta, ImageryService, ListImagesRequest,
    ListImagesResponse, ReduceRegionRequest, ReduceRegionResponse, TileLayer, TilesRequest,
};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RemoteSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base: Duration::from_millis(settings.backoff_base_ms),
            max: Duration::from_millis(settings.backoff_max_ms),
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_email: &'a str,
    key_data: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

#[derive(Deserialize)]
struct CompositeResponse {
    image_id: String,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Refresh tokens this long before the server says they expire.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// Bearer-authenticated JSON client for the imagery service.
pub struct ImageryClient {
    http: reqwest::Client,
    base_url: String,
    token_uri: String,
    credentials: ServiceAccountKey,
    retry: RetryPolicy,
    token: Mutex<Option<AccessToken>>,
}

impl ImageryClient {
    /// Build a client. No request is made until the first call.
    ///
    /// The token endpoint is taken from `settings.token_uri`, then from the
    /// credential document, then defaults to `{base_url}/v1/token`.
    pub fn new(settings: &RemoteSettings, credentials: ServiceAccountKey) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        let token_uri = settings
            .token_uri
            .clone()
            .or_else(|| credentials.token_uri().map(str::to_string))
            .unwrap_or_else(|| format!("{base_url}/v1/token"));

        Ok(Self {
            http,
            base_url,
            token_uri,
            credentials,
            retry: RetryPolicy::from_settings(settings),
            token: Mutex::new(None),
        })
    }

    /// Parse `credentials_json` and build a client. Bad credentials fail here,
    /// before any network traffic.
    pub fn connect(settings: &RemoteSettings, credentials_json: &str) -> Result<Self> {
        let credentials = ServiceAccountKey::from_json(credentials_json)?;
        Self::new(settings, credentials)
    }

    /// Build a client from the credential document in `settings.credentials_env`.
    pub fn from_env(settings: &RemoteSettings) -> Result<Self> {
        let credentials = ServiceAccountKey::from_env(&settings.credentials_env)?;
        Self::new(settings, credentials)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Exchange the credentials for a bearer token, reusing a cached one
    /// while it is still valid.
    pub async fn authenticate(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.expires_at
        {
            return Ok(token.value.clone());
        }

        info!(identity = %self.credentials.client_email(), "requesting access token");
        let body = TokenRequest {
            client_email: self.credentials.client_email(),
            key_data: self.credentials.private_key(),
        };
        let resp: TokenResponse = self.post_json(&self.token_uri, &body, None).await?;
        if resp.access_token.is_empty() {
            return Err(RemoteError::Authentication(
                "token endpoint returned an empty token".into(),
            ));
        }

        let lifetime = Duration::from_secs(resp.expires_in).saturating_sub(TOKEN_SLACK);
        let value = resp.access_token;
        *cached = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    async fn call<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let token = self.authenticate().await?;
        let url = format!("{}{path}", self.base_url);
        let result = self.post_json(&url, body, Some(&token)).await;
        if let Err(RemoteError::Authentication(_)) = &result {
            // The service no longer accepts this token; fetch a new one next call.
            warn!(url = %url, "bearer token rejected, discarding cached token");
            self.token.lock().await.take();
        }
        result
    }

    /// POST `body` as JSON, retrying transient failures with backoff.
    async fn post_json<B, T>(&self, url: &str, body: &B, bearer: Option<&str>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut request = self.http.post(url).json(body);
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            let retry_allowed = attempt <= self.retry.max_retries;
            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let text = resp.text().await.map_err(|source| RemoteError::Service {
                            attempts: attempt,
                            source,
                        })?;
                        debug!(url = %url, attempt, "request succeeded");
                        return Ok(serde_json::from_str(&text)?);
                    }

                    let body = resp.text().await.unwrap_or_default();
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(RemoteError::Authentication(format!(
                            "{url} rejected credentials ({status}): {body}"
                        )));
                    }
                    if !(is_retryable_status(status) && retry_allowed) {
                        return Err(RemoteError::Server {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    warn!(
                        url = %url,
                        status = status.as_u16(),
                        attempt,
                        "transient service error, retrying"
                    );
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && retry_allowed => {
                    warn!(url = %url, attempt, error = %e, "request failed, retrying");
                }
                Err(source) => {
                    return Err(RemoteError::Service {
                        attempts: attempt,
                        source,
                    });
                }
            }

            tokio::time::sleep(self.retry.delay(attempt)).await;
        }
    }
}

#[async_trait]
impl ImageryService for ImageryClient {
    async fn list_images(
        &self,
        filter: &CollectionFilter,
        query: &ImageryQuery,
    ) -> Result<Vec<ImageMeta>> {
        let resp: ListImagesResponse = self
            .call("/v1/images:list", &ListImagesRequest::new(filter, query))
            .await?;
        info!(collection = %filter.collection, count = resp.images.len(), "listed images");
        Ok(resp.images)
    }

    async fn reduce_region(&self, request: &ReduceRegionRequest) -> Result<Option<f64>> {
        let resp: ReduceRegionResponse = self.call("/v1/images:reduceRegion", request).await?;
        Ok(resp.value)
    }

    async fn composite(
        &self,
        filter: &CollectionFilter,
        query: &ImageryQuery,
        index: &IndexSpec,
    ) -> Result<ImageHandle> {
        let request = CompositeRequest {
            images: ListImagesRequest::new(filter, query),
            index,
            reducer: "median",
            clip: true,
        };
        let resp: CompositeResponse = self.call("/v1/images:composite", &request).await?;
        info!(image = %resp.image_id, "composite ready");
        Ok(ImageHandle {
            image_id: resp.image_id,
        })
    }

    async fn tile_layer(&self, handle: &ImageHandle, vis: &VisParams) -> Result<TileLayer> {
        let request = TilesRequest {
            image_id: &handle.image_id,
            vis,
        };
        self.call("/v1/images:tiles", &request).await
    }
}
