//! ManyBooks adapter.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;

use super::{selector, text_of};
use crate::fetcher::PageFetcher;
use crate::{Book, Engine, EngineConfig, Result, SearchError, SearchQuery};

const AUTHOR_PATTERN: &str = r"<br\s*/?>\s*by\s+([^<]+)";

/// ManyBooks search.
///
/// ManyBooks can render any title as Kindle `azw` on the fly, so every
/// locator points at that conversion endpoint and the format is assumed.
pub struct ManyBooks {
    config: EngineConfig,
    fetcher: Arc<dyn PageFetcher>,
}

impl ManyBooks {
    /// Creates a new ManyBooks engine with the given page fetcher.
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config: EngineConfig {
                name: "ManyBooks".to_string(),
                shortcut: "manybooks".to_string(),
                base_url: "http://www.manybooks.net".to_string(),
                timeout: 10,
                enabled: true,
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

    fn kindle_url(&self, href: &str) -> String {
        let slug = href.replace(".html", "").replace("/titles/", "");
        self.config
            .url(&format!("send/1:kindle:.azw:kindle/{slug}/{slug}.azw"))
    }

    fn parse_results(&self, html: &str) -> Result<Vec<Book>> {
        let document = Html::parse_document(html);

        let entry_selector = selector("div.row, div.grid_12")?;
        let link_selector = selector("a[href]")?;
        let author_pattern = Regex::new(AUTHOR_PATTERN)
            .map_err(|e| SearchError::Parse(format!("Failed to compile pattern: {e}")))?;

        let mut results = Vec::new();

        for entry in document.select(&entry_selector) {
            let link = match entry.select(&link_selector).next() {
                Some(link) => link,
                None => continue,
            };
            let href = link.value().attr("href").unwrap_or_default();
            if !href.contains("/titles/") {
                continue;
            }

            let author = author_pattern
                .captures(&entry.html())
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();

            results.push(
                Book::new(
                    text_of(link),
                    author,
                    "azw",
                    &self.config.name,
                    self.kindle_url(href),
                )
                .assumed_format(),
            );
        }

        Ok(results)
    }
}

#[async_trait]
impl Engine for ManyBooks {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Book>> {
        let url = self
            .config
            .url(&format!("search.php?search={}", query.form_encoded()));

        let html = self.fetcher.fetch(&url).await?;

        self.parse_results(&html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::StaticFetcher;
    use crate::FormatOrigin;

    const PAGE: &str = r#"
    <html><body>
      <div class="grid_12 row">
        <a href="/titles/melvilleh2701.html">Moby Dick</a><br/>by Herman Melville
      </div>
      <div class="row"><a href="/about.html">About ManyBooks</a></div>
      <div class="grid_12"><a href="/titles/anon01.html">Whale Tales</a></div>
    </body></html>
    "#;

    fn engine() -> ManyBooks {
        ManyBooks::new(Arc::new(StaticFetcher::new())).with_base_url("http://mb.test")
    }

    #[test]
    fn test_manybooks_new() {
        let engine = engine();
        assert_eq!(engine.name(), "ManyBooks");
        assert_eq!(engine.shortcut(), "manybooks");
    }

    #[test]
    fn test_manybooks_kindle_url() {
        assert_eq!(
            engine().kindle_url("/titles/melvilleh2701.html"),
            "http://mb.test/send/1:kindle:.azw:kindle/melvilleh2701/melvilleh2701.azw"
        );
    }

    #[test]
    fn test_manybooks_parse_results() {
        let results = engine().parse_results(PAGE).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Moby Dick");
        assert_eq!(results[0].author, "Herman Melville");
        assert_eq!(results[0].format, "azw");
        assert_eq!(results[0].format_origin, FormatOrigin::Assumed);
        assert_eq!(results[1].title, "Whale Tales");
        assert_eq!(results[1].author, "Unknown");
    }

    #[tokio::test]
    async fn test_manybooks_search() {
        let fetcher = StaticFetcher::new().page("http://mb.test/search.php?search=moby+dick", PAGE);
        let engine = ManyBooks::new(Arc::new(fetcher)).with_base_url("http://mb.test");
        let results = engine.search(&SearchQuery::new("moby dick")).await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
