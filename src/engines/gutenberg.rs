//! Project Gutenberg adapter.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;

use super::{selector, text_of};
use crate::fetcher::PageFetcher;
use crate::{Book, Engine, EngineConfig, Result, SearchError, SearchQuery};

/// Project Gutenberg search.
///
/// Gutenberg bans clients that search too often for about 24 hours; a ban
/// surfaces as `SearchError::EngineSuspended` so the caller can turn the
/// engine off in the settings.
pub struct Gutenberg {
    config: EngineConfig,
    fetcher: Arc<dyn PageFetcher>,
}

impl Gutenberg {
    /// Creates a new Gutenberg engine with the given page fetcher.
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config: EngineConfig {
                name: "Gutenberg".to_string(),
                shortcut: "gutenberg".to_string(),
                base_url: "https://www.gutenberg.org".to_string(),
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

    fn suspended(&self, reason: String) -> SearchError {
        SearchError::EngineSuspended(
            self.config.name.clone(),
            format!("{reason}; probably banned for 24 hours by the Gutenberg rate limiter"),
        )
    }

    fn parse_results(&self, html: &str) -> Result<Vec<Book>> {
        let document = Html::parse_document(html);

        let entry_selector = selector("li.booklink")?;
        let title_selector = selector("span.title")?;
        let author_selector = selector("span.subtitle")?;
        let link_selector = selector("a[href]")?;

        let mut results = Vec::new();

        for entry in document.select(&entry_selector) {
            let href = match entry
                .select(&link_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
            {
                Some(href) => href,
                None => continue,
            };

            let title = entry
                .select(&title_selector)
                .next()
                .map(text_of)
                .unwrap_or_default();
            let author = entry
                .select(&author_selector)
                .next()
                .map(text_of)
                .unwrap_or_default();

            let locator = self.config.url(&format!("{href}.kindle.images"));
            results.push(Book::new(title, author, "mobi", &self.config.name, locator).assumed_format());
        }

        Ok(results)
    }
}

#[async_trait]
impl Engine for Gutenberg {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Book>> {
        let url = self
            .config
            .url(&format!("ebooks/search/?query={}", query.form_encoded()));

        let html = match self.fetcher.fetch(&url).await {
            Ok(html) => html,
            Err(SearchError::HttpStatus { status, .. }) if status == 403 || status == 429 => {
                return Err(self.suspended(format!("HTTP {status}")));
            }
            Err(SearchError::Http(e)) if e.is_body() || e.is_decode() => {
                return Err(self.suspended(format!("unreadable response ({e})")));
            }
            Err(e) => return Err(e),
        };

        self.parse_results(&html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::StaticFetcher;
    use crate::FormatOrigin;

    const PAGE: &str = r#"
    <html><body><ul class="results">
      <li class="booklink">
        <a class="link" href="/ebooks/2701">
          <span class="cell content">
            <span class="title">Moby Dick; Or, The Whale</span>
            <span class="subtitle">Herman Melville</span>
          </span>
        </a>
      </li>
      <li class="booklink">
        <a class="link" href="/ebooks/15">
          <span class="title">Moby Dick</span>
        </a>
      </li>
    </ul></body></html>
    "#;

    fn engine(fetcher: StaticFetcher) -> Gutenberg {
        Gutenberg::new(Arc::new(fetcher)).with_base_url("http://pg.test")
    }

    #[test]
    fn test_gutenberg_new() {
        let engine = Gutenberg::new(Arc::new(StaticFetcher::new()));
        assert_eq!(engine.name(), "Gutenberg");
        assert_eq!(engine.shortcut(), "gutenberg");
        assert!(engine.is_enabled());
    }

    #[test]
    fn test_gutenberg_parse_results() {
        let results = engine(StaticFetcher::new()).parse_results(PAGE).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Moby Dick; Or, The Whale");
        assert_eq!(results[0].author, "Herman Melville");
        assert_eq!(results[0].locator, "http://pg.test/ebooks/2701.kindle.images");
        assert_eq!(results[0].format, "mobi");
        assert_eq!(results[0].format_origin, FormatOrigin::Assumed);
        assert_eq!(results[1].author, "Unknown");
    }

    #[test]
    fn test_gutenberg_parse_results_empty() {
        let results = engine(StaticFetcher::new())
            .parse_results("<html><body>No records found.</body></html>")
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_gutenberg_search_builds_url() {
        let fetcher = StaticFetcher::new().page("http://pg.test/ebooks/search/?query=moby+dick", PAGE);
        let engine = engine(fetcher);
        let results = engine.search(&SearchQuery::new("moby dick")).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_gutenberg_rate_limited_is_suspension() {
        let fetcher = StaticFetcher::new().status("http://pg.test/ebooks/search/?query=moby", 429);
        let err = engine(fetcher)
            .search(&SearchQuery::new("moby"))
            .await
            .unwrap_err();
        match err {
            SearchError::EngineSuspended(name, reason) => {
                assert_eq!(name, "Gutenberg");
                assert!(reason.contains("429"));
            }
            other => panic!("expected suspension, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_gutenberg_other_status_is_error() {
        let fetcher = StaticFetcher::new().status("http://pg.test/ebooks/search/?query=moby", 500);
        let err = engine(fetcher)
            .search(&SearchQuery::new("moby"))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_gutenberg_garbled_body_is_suspension() {
        use std::time::Duration;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ebooks/search/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-encoding", "gzip")
                    .set_body_string("<html>not gzip at all</html>"),
            )
            .mount(&server)
            .await;

        let fetcher = crate::HttpFetcher::new(Duration::from_secs(5), None).unwrap();
        let err = Gutenberg::new(Arc::new(fetcher))
            .with_base_url(server.uri())
            .search(&SearchQuery::new("moby"))
            .await
            .unwrap_err();
        match err {
            SearchError::EngineSuspended(name, reason) => {
                assert_eq!(name, "Gutenberg");
                assert!(reason.contains("unreadable response"));
            }
            other => panic!("expected suspension, got {other:?}"),
        }
    }
}
