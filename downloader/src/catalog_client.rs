/// HTTP client for the catalog server's `/media-list` endpoint.
use mediablob_shared::{Asset, ClientError};
use reqwest::{Client, Url};
use tracing::{debug, info};

const MEDIA_LIST_PATH: &str = "media-list";

/// Fetches and decodes the remote asset list. No retries happen here.
#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `<base>/media-list`, keeping any path prefix on the base address.
    pub fn media_list_url(&self) -> Result<Url, ClientError> {
        let mut base = self.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        base.join(MEDIA_LIST_PATH)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.base_url, e)))
    }

    /// Issue one `GET /media-list` and decode the JSON array.
    pub async fn fetch_catalog(&self) -> Result<Vec<Asset>, ClientError> {
        let url = self.media_list_url()?;
        debug!("Fetching catalog from {}", url);

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let assets: Vec<Asset> =
            serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))?;

        info!("Fetched {} assets from {}", assets.len(), url);
        Ok(assets)
    }
}
