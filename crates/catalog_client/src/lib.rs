//! HTTP side of the data catalog.
//!
//! [`CatalogClient`] talks to the catalog service: it reads asset records and
//! implements [`VersionService`] over the `/assets/{id}/versions` routes.
//! [`ReqwestFetcher`] is the plain GET used for `url` locations.

use catalog_core::prelude::*;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

pub const DEFAULT_URL: &str = "http://localhost:8080";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the catalog service.
    pub base_url: String,
    /// Sent as a bearer token on every request.
    pub token: Option<String>,
    /// Whole-request timeout. `None` waits indefinitely.
    ///
    /// Defaults to 30 seconds.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_URL.to_string(),
            token: None,
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

fn build_client(timeout: Option<Duration>) -> Result<Client, reqwest::Error> {
    let builder = Client::builder();
    match timeout {
        Some(timeout) => builder.timeout(timeout),
        None => builder,
    }
    .build()
}

#[derive(Clone)]
pub struct CatalogClient {
    base_url: String,
    client: Client,
    token: Option<String>,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
            token,
        }
    }

    pub fn from_config(config: ClientConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(config.timeout)?,
            base_url: config.base_url,
            token: config.token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/assets/{id}/...`, with every segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, VersionError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| VersionError::Transport(format!("invalid base url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| VersionError::Transport(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .push("assets")
            .extend(segments);
        Ok(url)
    }

    fn auth_request(&self, builder: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            builder.bearer_auth(token)
        } else {
            builder
        }
    }

    /// Sends the request; a 404 becomes `not_found`, any other failure
    /// status a [`VersionError::Server`].
    async fn send(
        &self,
        method: Method,
        url: Url,
        not_found: impl FnOnce() -> VersionError,
    ) -> Result<Response, VersionError> {
        debug!(%method, %url, "Calling catalog service");
        let response = self
            .auth_request(self.client.request(method, url))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(not_found());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Catalog service returned an error");
            return Err(VersionError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Reads the asset record `GET {base}/assets/{id}`.
    #[instrument(skip(self))]
    pub async fn fetch_asset(&self, asset_id: &str) -> Result<AssetResponse, VersionError> {
        let url = self.endpoint(&[asset_id])?;
        let response = self
            .send(Method::GET, url, || {
                VersionError::AssetNotFound(asset_id.to_string())
            })
            .await?;
        response.json().await.map_err(invalid_body)
    }

    /// [`Self::fetch_asset`] mapped into the domain [`Asset`].
    pub async fn get_asset(&self, asset_id: &str) -> Result<Asset, VersionError> {
        self.fetch_asset(asset_id).await.map(Asset::from_response)
    }
}

fn transport(e: reqwest::Error) -> VersionError {
    if e.is_timeout() {
        VersionError::Transport(format!("request timed out: {e}"))
    } else {
        VersionError::Transport(e.to_string())
    }
}

fn invalid_body(e: reqwest::Error) -> VersionError {
    VersionError::Transport(format!("invalid response body: {e}"))
}

fn version_not_found(asset_id: &str, name: &str) -> impl FnOnce() -> VersionError {
    let asset_id = asset_id.to_string();
    let version = name.to_string();
    move || VersionError::NotFound { asset_id, version }
}

impl VersionService for CatalogClient {
    #[instrument(skip(self))]
    async fn get_version(&self, asset_id: &str, name: &str) -> Result<Version, VersionError> {
        let url = self.endpoint(&[asset_id, "versions", name])?;
        let response = self
            .send(Method::GET, url, version_not_found(asset_id, name))
            .await?;
        response.json().await.map_err(invalid_body)
    }

    #[instrument(skip(self))]
    async fn list_versions(&self, asset_id: &str) -> Result<Vec<Version>, VersionError> {
        let url = self.endpoint(&[asset_id, "versions"])?;
        let response = self
            .send(Method::GET, url, || {
                VersionError::AssetNotFound(asset_id.to_string())
            })
            .await?;
        response.json().await.map_err(invalid_body)
    }

    #[instrument(skip(self))]
    async fn create_version(&self, asset_id: &str) -> Result<Version, VersionError> {
        let url = self.endpoint(&[asset_id, "versions"])?;
        let response = self
            .send(Method::POST, url, || {
                VersionError::AssetNotFound(asset_id.to_string())
            })
            .await?;
        response.json().await.map_err(invalid_body)
    }

    #[instrument(skip(self))]
    async fn delete_version(&self, asset_id: &str, name: &str) -> Result<(), VersionError> {
        let url = self.endpoint(&[asset_id, "versions", name])?;
        self.send(Method::DELETE, url, version_not_found(asset_id, name))
            .await?;
        Ok(())
    }
}

/// [`HttpFetcher`] over `reqwest`, streaming the response body.
#[derive(Clone, Default)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(Some(timeout))?,
        })
    }
}

fn storage(e: reqwest::Error) -> StorageError {
    match e.url() {
        Some(url) if e.is_timeout() => StorageError::Timeout(url.to_string()),
        _ => StorageError::Transfer(e.to_string()),
    }
}

impl HttpFetcher for ReqwestFetcher {
    #[instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<ByteStream, StorageError> {
        let response = self.client.get(url).send().await.map_err(storage)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Download failed");
            return Err(StorageError::Transfer(format!("{url} returned {status}: {body}")));
        }

        Ok(response.bytes_stream().map_err(storage).boxed())
    }
}
