//! LibreLib adapter.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html};

use super::{absolute, selector, text_of};
use crate::fetcher::PageFetcher;
use crate::{Book, Engine, EngineConfig, Result, SearchQuery};

/// LibreLib search.
///
/// Each result row links author, title and one file; the file link text is
/// the format. Disabled by default since the site is often unreachable.
pub struct LibreLib {
    config: EngineConfig,
    fetcher: Arc<dyn PageFetcher>,
}

impl LibreLib {
    /// Creates a new LibreLib engine with the given page fetcher.
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config: EngineConfig {
                name: "LibreLib".to_string(),
                shortcut: "librelib".to_string(),
                base_url: "http://www.librelib.com".to_string(),
                timeout: 10,
                enabled: false,
            },
            fetcher,
        }
    }

    /// Creates with custom configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Points the engine at another host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    fn parse_results(&self, page_url: &str, html: &str) -> Result<Vec<Book>> {
        let document = Html::parse_document(html);

        let row_selector = selector("tr")?;
        let cell_selector = selector("td")?;
        let link_selector = selector("a[href]")?;

        let mut results = Vec::new();

        for row in document.select(&row_selector).skip(1) {
            let links: Vec<ElementRef<'_>> = row.select(&link_selector).collect();
            let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
            if links.len() < 3 || cells.len() < 2 {
                continue;
            }

            let file_link = links[links.len() - 1];
            let href = file_link.value().attr("href").unwrap_or_default();

            results.push(
                Book::new(
                    text_of(links[1]),
                    text_of(links[0]),
                    text_of(file_link),
                    &self.config.name,
                    absolute(page_url, href)?,
                )
                .with_size(text_of(cells[cells.len() - 2])),
            );
        }

        Ok(results)
    }
}

#[async_trait]
impl Engine for LibreLib {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Book>> {
        let url = self.config.url(&format!("book?s={}", query.form_encoded()));

        let html = self.fetcher.fetch(&url).await?;

        self.parse_results(&url, &html)
    }
}
