//! HTTP-based page fetcher using reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy, Response};
use tracing::debug;

use crate::fetcher::PageFetcher;
use crate::{Result, SearchError};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; booksnake/0.4)";

/// A page fetcher that uses plain HTTP requests via reqwest.
///
/// One client is shared by every engine and the retriever.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates an `HttpFetcher` with a request timeout and an optional proxy URL
    /// (`http://`, `https://` or `socks5://`).
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT).timeout(timeout);
        if let Some(proxy) = proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Creates an `HttpFetcher` with a custom reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<Response> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let html = self.get(url).await?.text().await?;
        Ok(html)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self.get(url).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
