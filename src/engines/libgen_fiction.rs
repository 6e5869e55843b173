//! Library Genesis fiction index adapter.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html};

use super::{absolute, selector, text_of};
use crate::fetcher::PageFetcher;
use crate::{Book, Engine, EngineConfig, Result, SearchError, SearchQuery};

/// Format tag and optional parenthesized size, e.g. `EPUB(1 Mb)`.
const FILE_PATTERN: &str = r"^\s*([A-Za-z0-9]+)\s*(?:\((.*)\))?";

/// Library Genesis fiction search.
///
/// The file column reads like `EPUB(1 Mb)`. Like the main index, rows link
/// to a landing page that has to be resolved before download.
pub struct LibGenFiction {
    config: EngineConfig,
    fetcher: Arc<dyn PageFetcher>,
}

impl LibGenFiction {
    /// Creates a new LibGen fiction engine with the given page fetcher.
    ///
    /// Disabled by default: the fiction index is slow and often down.
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config: EngineConfig {
                name: "LibGen Fiction".to_string(),
                shortcut: "libgen-fiction".to_string(),
                base_url: "http://libgen.is".to_string(),
                timeout: 15,
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

        let table_selector = selector("table")?;
        let row_selector = selector("tr")?;
        let cell_selector = selector("td")?;
        let link_selector = selector("a[href]")?;
        let file_pattern = Regex::new(FILE_PATTERN)
            .map_err(|e| SearchError::Parse(format!("Failed to compile pattern: {e}")))?;

        let table = match document.select(&table_selector).last() {
            Some(table) => table,
            None => return Ok(Vec::new()),
        };

        let mut results = Vec::new();

        for row in table.select(&row_selector) {
            let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
            let links: Vec<&str> = row
                .select(&link_selector)
                .filter_map(|a| a.value().attr("href"))
                .collect();
            if cells.len() < 4 || links.len() < 2 {
                continue;
            }

            let landing = absolute(page_url, links[links.len() - 2])?;
            let (format, size) = split_file_column(&file_pattern, &text_of(cells[cells.len() - 1]));
            let title = format!("{} {}", text_of(cells[1]), text_of(cells[2]))
                .trim()
                .to_string();

            results.push(
                Book::new(title, text_of(cells[0]), format, &self.config.name, landing).with_size(size),
            );
        }

        Ok(results)
    }

    fn parse_landing(&self, landing_url: &str, html: &str) -> Result<String> {
        let document = Html::parse_document(html);
        let link_selector = selector("a[href]")?;

        let href = document
            .select(&link_selector)
            .last()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| {
                SearchError::Parse(format!("no download link on landing page {landing_url}"))
            })?;

        absolute(landing_url, href)
    }
}

fn split_file_column(pattern: &Regex, column: &str) -> (String, String) {
    match pattern.captures(column) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string(),
            caps.get(2).map(|m| m.as_str()).unwrap_or_default().to_string(),
        ),
        None => (column.trim().to_string(), String::new()),
    }
}

#[async_trait]
impl Engine for LibGenFiction {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Book>> {
        let url = self.config.url(&format!(
            "foreignfiction/index.php?s={}&f_lang=English&f_columns=0&f_ext=All",
            query.form_encoded()
        ));

        let html = self.fetcher.fetch(&url).await?;

        self.parse_results(&url, &html)
    }

    async fn resolve(&self, locator: &str) -> Result<String> {
        let html = self.fetcher.fetch(locator).await?;
        self.parse_landing(locator, &html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::StaticFetcher;

    const PAGE: &str = r#"
    <html><body>
    <table><tr><td>menu</td></tr></table>
    <table>
      <tr><td>Author</td><td>Series</td><td>Title</td><td>Language</td><td>File</td></tr>
      <tr><td>Frank Herbert</td><td>Dune</td><td>Dune Messiah</td><td>English</td>
          <td>EPUB(1 Mb)<a href="/foreignfiction/ads.php?md5=F1">[1]</a><a href="http://other.test/x">[2]</a></td></tr>
      <tr><td>Frank Herbert</td><td></td><td>Dune</td><td>English</td>
          <td>MOBI<a href="/foreignfiction/ads.php?md5=F2">[1]</a><a href="http://other.test/y">[2]</a></td></tr>
    </table>
    </body></html>
    "#;

    fn engine(fetcher: StaticFetcher) -> LibGenFiction {
        LibGenFiction::new(Arc::new(fetcher)).with_base_url("http://lgf.test")
    }

    #[test]
    fn test_libgen_fiction_disabled_by_default() {
        let engine = engine(StaticFetcher::new());
        assert_eq!(engine.shortcut(), "libgen-fiction");
        assert!(!engine.is_enabled());
    }

    #[test]
    fn test_split_file_column() {
        let pattern = Regex::new(FILE_PATTERN).unwrap();
        assert_eq!(
            split_file_column(&pattern, "EPUB(1 Mb)[1][2]"),
            ("EPUB".to_string(), "1 Mb".to_string())
        );
        assert_eq!(
            split_file_column(&pattern, "MOBI[1][2]"),
            ("MOBI".to_string(), String::new())
        );
    }

    #[test]
    fn test_libgen_fiction_parse_results() {
        let results = engine(StaticFetcher::new())
            .parse_results("http://lgf.test/foreignfiction/index.php?s=dune", PAGE)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Dune Dune Messiah");
        assert_eq!(results[0].author, "Frank Herbert");
        assert_eq!(results[0].format, "epub");
        assert_eq!(results[0].size.as_deref(), Some("1 Mb"));
        assert_eq!(results[0].locator, "http://lgf.test/foreignfiction/ads.php?md5=F1");
        assert_eq!(results[1].title, "Dune");
        assert_eq!(results[1].format, "mobi");
        assert!(results[1].size.is_none());
    }

    #[tokio::test]
    async fn test_libgen_fiction_resolve_takes_last_link() {
        let landing = r#"<a href="/">home</a><a href="http://dl.test/get.php?md5=F1">GET</a>"#;
        let fetcher = StaticFetcher::new().page("http://lgf.test/foreignfiction/ads.php?md5=F1", landing);
        let url = engine(fetcher)
            .resolve("http://lgf.test/foreignfiction/ads.php?md5=F1")
            .await
            .unwrap();
        assert_eq!(url, "http://dl.test/get.php?md5=F1");
    }
}
