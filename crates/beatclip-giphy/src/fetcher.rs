//! Keyword-to-media fetch capability.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::client::{normalize_query, GiphyClient};
use crate::error::FetchResult;

/// Local media resolved for a keyword query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle {
    pub query: String,
    /// Downloaded file, ready to render from
    pub path: PathBuf,
    /// Where the media came from, if remote
    pub url: Option<String>,
}

/// Resolves a keyword query to local media.
///
/// `None` means "nothing usable"; callers fall back to the clip bank.
/// Implementations swallow their own errors.
#[async_trait]
pub trait KeywordImageFetcher: Send + Sync {
    async fn fetch(&self, query: &str) -> Option<MediaHandle>;
}

/// Fetcher backed by GIPHY search with an on-disk media cache.
pub struct GiphyFetcher {
    client: GiphyClient,
    cache_dir: PathBuf,
}

impl GiphyFetcher {
    pub fn new(client: GiphyClient) -> Self {
        let cache_dir = client.config().cache_dir.clone();
        Self { client, cache_dir }
    }

    /// Create from environment variables.
    pub fn from_env() -> FetchResult<Self> {
        Ok(Self::new(GiphyClient::from_env()?))
    }

    /// Cache file for a media URL.
    pub fn cache_path(&self, url: &str) -> PathBuf {
        media_cache_path(&self.cache_dir, url)
    }

    async fn resolve(&self, query: &str) -> FetchResult<Option<MediaHandle>> {
        let urls = self.client.search_mp4_urls(query).await?;
        let Some(url) = urls.into_iter().next() else {
            return Ok(None);
        };

        let path = self.cache_path(&url);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(query, path = %path.display(), "Media cache hit");
        } else {
            self.client.download(&url, &path).await?;
        }

        Ok(Some(MediaHandle {
            query: normalize_query(query),
            path,
            url: Some(url),
        }))
    }
}

#[async_trait]
impl KeywordImageFetcher for GiphyFetcher {
    async fn fetch(&self, query: &str) -> Option<MediaHandle> {
        match self.resolve(query).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(query, "Keyword fetch failed: {}", e);
                None
            }
        }
    }
}

/// `<dir>/<sha256(url)>.mp4`
pub fn media_cache_path(dir: &Path, url: &str) -> PathBuf {
    let digest = Sha256::digest(url.as_bytes());
    dir.join(format!("{:x}.mp4", digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GiphyConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer, cache_dir: &Path) -> GiphyFetcher {
        let config = GiphyConfig {
            api_key: Some("k".to_string()),
            base_url: server.uri(),
            max_retries: 0,
            cache_dir: cache_dir.to_path_buf(),
            ..Default::default()
        };
        GiphyFetcher::new(GiphyClient::new(config).unwrap())
    }

    #[test]
    fn test_cache_path_is_stable() {
        let dir = Path::new("/cache");
        let a = media_cache_path(dir, "https://media/1.mp4");
        let b = media_cache_path(dir, "https://media/1.mp4");
        let c = media_cache_path(dir, "https://media/2.mp4");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.extension().unwrap(), "mp4");
        assert_eq!(a.file_stem().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_fetch_downloads_first_result_once() {
        let server = MockServer::start().await;
        let media_url = format!("{}/media/1.mp4", server.uri());
        Mock::given(method("GET"))
            .and(path("/v1/gifs/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"id": "1", "images": {"original": {"mp4": media_url}}},
                    {"id": "2", "images": {"original": {"mp4": "https://unused/2.mp4"}}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/media/1.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = fetcher(&server, dir.path());

        let handle = fetcher.fetch("Sunset").await.unwrap();
        assert_eq!(handle.query, "sunset");
        assert!(handle.path.starts_with(dir.path()));
        assert_eq!(tokio::fs::read(&handle.path).await.unwrap(), b"mp4");

        let again = fetcher.fetch("sunset").await.unwrap();
        assert_eq!(again.path, handle.path);
    }

    #[tokio::test]
    async fn test_fetch_returns_none_on_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/gifs/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        assert!(fetcher(&server, dir.path()).fetch("sunset").await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_returns_none_without_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/gifs/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        assert!(fetcher(&server, dir.path()).fetch("nothing").await.is_none());
    }
}
