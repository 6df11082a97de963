//! GIPHY search HTTP client.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{FetchError, FetchResult};
use crate::types::SearchResponse;

/// Configuration for the GIPHY client.
#[derive(Debug, Clone)]
pub struct GiphyConfig {
    /// API key; without one the client runs in placeholder mode
    pub api_key: Option<String>,
    /// Base URL of the API
    pub base_url: String,
    /// Results requested per search
    pub limit: u32,
    /// Content rating filter
    pub rating: String,
    pub lang: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Max retries for retryable failures
    pub max_retries: u32,
    /// Directory for downloaded media
    pub cache_dir: PathBuf,
}

impl Default for GiphyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.giphy.com".to_string(),
            limit: 25,
            rating: "g".to_string(),
            lang: "en".to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 1,
            cache_dir: std::env::temp_dir().join("beatclip-giphy"),
        }
    }
}

impl GiphyConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("GIPHY_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            base_url: std::env::var("GIPHY_BASE_URL").unwrap_or(defaults.base_url),
            limit: std::env::var("GIPHY_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.limit),
            rating: std::env::var("GIPHY_RATING").unwrap_or(defaults.rating),
            lang: std::env::var("GIPHY_LANG").unwrap_or(defaults.lang),
            timeout: Duration::from_secs(
                std::env::var("GIPHY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            max_retries: std::env::var("GIPHY_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            cache_dir: std::env::var("BEATCLIP_GIPHY_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
        }
    }
}

/// Normalized cache key for a query.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Client for the GIPHY search API.
///
/// Successful searches are cached per normalized query for the lifetime of
/// the client; failures are not cached.
pub struct GiphyClient {
    http: Client,
    config: GiphyConfig,
    cache: Mutex<HashMap<String, Vec<String>>>,
}

impl GiphyClient {
    /// Create a new client.
    pub fn new(config: GiphyConfig) -> FetchResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(FetchError::Network)?;

        if config.api_key.is_none() {
            info!("GiphyClient is in placeholder mode (no API key provided)");
        }

        Ok(Self {
            http,
            config,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> FetchResult<Self> {
        Self::new(GiphyConfig::from_env())
    }

    pub fn config(&self) -> &GiphyConfig {
        &self.config
    }

    pub fn is_placeholder(&self) -> bool {
        self.config.api_key.is_none()
    }

    /// MP4 URLs for a query, in result order.
    ///
    /// Placeholder mode and blank queries yield an empty list.
    pub async fn search_mp4_urls(&self, query: &str) -> FetchResult<Vec<String>> {
        let key = normalize_query(query);
        let api_key = match &self.config.api_key {
            Some(api_key) if !key.is_empty() => api_key,
            _ => {
                debug!(query, "Placeholder mode or blank query, skipping search");
                return Ok(Vec::new());
            }
        };

        if let Some(urls) = self.cache.lock().await.get(&key) {
            debug!(query, "Cache hit");
            return Ok(urls.clone());
        }

        info!(query, limit = self.config.limit, "Searching GIPHY");
        let response = self
            .with_retry(|| self.search_once(api_key, query.trim()))
            .await?;

        let urls = response.mp4_urls();
        info!(query, found = urls.len(), "GIPHY search complete");
        self.cache.lock().await.insert(key, urls.clone());
        Ok(urls)
    }

    /// Download `url` to `dest`, writing through a temporary file.
    pub async fn download(&self, url: &str, dest: &Path) -> FetchResult<()> {
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir).await?;

        let mut response = self.with_retry(|| self.get_once(url)).await?;

        let tmp = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(dir)?;
        let mut file = tokio::fs::File::from_std(tmp.reopen()?);
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;
        drop(file);

        if written == 0 {
            return Err(FetchError::InvalidResponse(format!("empty body from {}", url)));
        }

        tmp.persist(dest).map_err(|e| FetchError::Io(e.error))?;
        debug!(url, bytes = written, dest = %dest.display(), "Downloaded media");
        Ok(())
    }

    async fn search_once(&self, api_key: &str, query: &str) -> FetchResult<SearchResponse> {
        let url = format!("{}/v1/gifs/search", self.config.base_url.trim_end_matches('/'));
        let limit = self.config.limit.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("api_key", api_key),
                ("q", query),
                ("limit", limit.as_str()),
                ("rating", self.config.rating.as_str()),
                ("lang", self.config.lang.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        Ok(response.json::<SearchResponse>().await?)
    }

    async fn get_once(&self, url: &str) -> FetchResult<reqwest::Response> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        Ok(response)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> FetchResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = FetchResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(250 * 2u64.pow(attempt));
                    warn!(
                        "GIPHY request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
