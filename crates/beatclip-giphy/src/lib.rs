//! Keyword image fetcher backed by the GIPHY search API.
//!
//! Without a `GIPHY_API_KEY` the client runs in placeholder mode and every
//! fetch resolves to nothing, so callers fall back to the local clip bank.

pub mod client;
pub mod error;
pub mod fetcher;
pub mod types;

pub use client::{GiphyClient, GiphyConfig};
pub use error::{FetchError, FetchResult};
pub use fetcher::{GiphyFetcher, KeywordImageFetcher, MediaHandle};
