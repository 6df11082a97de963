//! GIPHY search API response types.

use serde::Deserialize;

/// Response of `GET /v1/gifs/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<GifObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GifObject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub images: Images,
}

/// The renditions we can use; GIPHY returns many more.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Images {
    pub original: Option<Rendition>,
    pub fixed_height: Option<Rendition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rendition {
    pub mp4: Option<String>,
}

impl GifObject {
    /// MP4 URL for this GIF: the original rendition, else fixed height.
    pub fn mp4_url(&self) -> Option<&str> {
        fn pick(r: &Option<Rendition>) -> Option<&str> {
            r.as_ref()
                .and_then(|r| r.mp4.as_deref())
                .filter(|url| !url.is_empty())
        }
        pick(&self.images.original).or_else(|| pick(&self.images.fixed_height))
    }
}

impl SearchResponse {
    /// MP4 URLs in result order.
    pub fn mp4_urls(&self) -> Vec<String> {
        self.data
            .iter()
            .filter_map(|gif| gif.mp4_url().map(str::to_string))
            .collect()
    }
}
