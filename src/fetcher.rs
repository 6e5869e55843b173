//! Page fetcher abstraction for retrieving HTML and file content.

use async_trait::async_trait;

use crate::Result;

/// Trait for fetching the content of a URL.
///
/// Implementations report connection failures as `SearchError::Http` and
/// non-2xx answers as `SearchError::HttpStatus`, so callers can tell a
/// dead host from a rate limiter.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches the body of the given URL as text.
    async fn fetch(&self, url: &str) -> Result<String>;

    /// Fetches the body of the given URL as raw bytes.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}
