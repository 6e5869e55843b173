//! Library Genesis (non-fiction index) adapter.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use tracing::debug;

use super::{absolute, rebase, selector, text_of};
use crate::fetcher::PageFetcher;
use crate::{Book, Engine, EngineConfig, Result, SearchError, SearchQuery};

const AUTHOR_COLUMN: usize = 1;
const TITLE_COLUMN: usize = 2;
const SIZE_COLUMN: usize = 7;
const EXTENSION_COLUMN: usize = 8;

/// Library Genesis search.
///
/// Result rows link to an `ads.php` landing page rather than the file, so
/// locators need [`Engine::resolve`] before download. The same landing page
/// exists on every LibGen host; those hosts become the book's mirrors.
pub struct LibGen {
    config: EngineConfig,
    fetcher: Arc<dyn PageFetcher>,
    mirror_hosts: Vec<String>,
}

impl LibGen {
    /// Creates a new LibGen engine with the given page fetcher.
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config: EngineConfig {
                name: "LibGen".to_string(),
                shortcut: "libgen".to_string(),
                base_url: "http://libgen.is".to_string(),
                timeout: 15,
                enabled: true,
            },
            fetcher,
            mirror_hosts: vec!["http://libgen.rs".to_string(), "http://libgen.st".to_string()],
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

    /// Replaces the alternate hosts used as mirrors.
    pub fn with_mirror_hosts(mut self, hosts: Vec<String>) -> Self {
        self.mirror_hosts = hosts;
        self
    }

    fn parse_results(&self, page_url: &str, html: &str) -> Result<Vec<Book>> {
        let document = Html::parse_document(html);

        let table_selector = selector("table")?;
        let results_table_selector = selector("table.c")?;
        let row_selector = selector("tr")?;
        let cell_selector = selector("td")?;
        let link_selector = selector("a[href]")?;

        let table = match document
            .select(&results_table_selector)
            .next()
            .or_else(|| document.select(&table_selector).nth(2))
        {
            Some(table) => table,
            None => return Ok(Vec::new()),
        };

        let mut results = Vec::new();

        for row in table.select(&row_selector).skip(1) {
            let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
            if cells.len() <= EXTENSION_COLUMN {
                continue;
            }

            let landing = row
                .select(&link_selector)
                .filter_map(|a| a.value().attr("href"))
                .find(|href| href.contains("ads.php"));
            let landing = match landing {
                Some(href) => absolute(page_url, href)?,
                None => {
                    debug!("LibGen row without a download link, skipping");
                    continue;
                }
            };

            let title_cell = cells[TITLE_COLUMN];
            let title = title_cell
                .select(&link_selector)
                .find(|a| {
                    a.value()
                        .attr("href")
                        .is_some_and(|href| href.contains("book/index.php"))
                })
                .map(|a| {
                    a.text()
                        .next()
                        .map(|t| t.trim().to_string())
                        .unwrap_or_default()
                })
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| text_of(title_cell));

            let mut book = Book::new(
                title,
                text_of(cells[AUTHOR_COLUMN]),
                text_of(cells[EXTENSION_COLUMN]),
                &self.config.name,
                landing.clone(),
            )
            .with_size(text_of(cells[SIZE_COLUMN]));

            for host in &self.mirror_hosts {
                book = book.with_mirror(rebase(&landing, host)?);
            }

            results.push(book);
        }

        Ok(results)
    }

    fn parse_landing(&self, landing_url: &str, html: &str) -> Result<String> {
        let document = Html::parse_document(html);
        let link_selector = selector("a[href]")?;

        let href = document
            .select(&link_selector)
            .find(|a| {
                a.value().attr("href").is_some_and(|h| h.contains("get.php"))
                    || text_of(*a).eq_ignore_ascii_case("get")
            })
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| {
                SearchError::Parse(format!("no download link on landing page {landing_url}"))
            })?;

        absolute(landing_url, href)
    }
}

#[async_trait]
impl Engine for LibGen {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Book>> {
        let url = self
            .config
            .url(&format!("search.php?req={}", query.form_encoded()));

        let html = self.fetcher.fetch(&url).await?;

        self.parse_results(&url, &html)
    }

    async fn resolve(&self, locator: &str) -> Result<String> {
        let html = self.fetcher.fetch(locator).await?;
        self.parse_landing(locator, &html)
    }
}
