//! Book retrieval: locator resolution, mirror fallback and file output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::fetcher::PageFetcher;
use crate::{Book, Engine, FormatOrigin, Result, Search, SearchError};

const EPUB_MIMETYPE: &[u8] = b"mimetypeapplication/epub+zip";

/// Downloaded book content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieved {
    /// Content kept in memory.
    Bytes {
        /// File content.
        data: Vec<u8>,
        /// Format recognized from the content, if any.
        detected_format: Option<String>,
    },
    /// Content written to disk.
    File {
        /// Where the content was written.
        path: PathBuf,
        /// Format recognized from the content, if any.
        detected_format: Option<String>,
    },
}

impl Retrieved {
    /// Format recognized from the downloaded bytes.
    pub fn detected_format(&self) -> Option<&str> {
        match self {
            Retrieved::Bytes {
                detected_format, ..
            }
            | Retrieved::File {
                detected_format, ..
            } => detected_format.as_deref(),
        }
    }
}

/// Fetches the bytes behind a book's locators.
///
/// Each locator is first resolved by the engine that produced the book,
/// then downloaded. Locators are tried in order until one yields a
/// non-empty body.
pub struct Retriever {
    fetcher: Arc<dyn PageFetcher>,
}

impl Retriever {
    /// Creates a retriever that downloads through `fetcher`.
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Downloads `book` using the engine registered under its source name.
    ///
    /// With a `destination` the content is written there and the path is
    /// returned; otherwise the bytes are returned.
    pub async fn retrieve(
        &self,
        search: &Search,
        book: &Book,
        destination: Option<&Path>,
    ) -> Result<Retrieved> {
        let engine = search
            .engine_named(&book.source)
            .ok_or_else(|| SearchError::UnknownSource(book.source.clone()))?;

        let data = self.fetch(engine.as_ref(), book).await?;
        let detected_format = sniff_format(&data).map(str::to_string);
        check_format(book, detected_format.as_deref());

        match destination {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, &data).await?;
                info!("Saved {} bytes to {}", data.len(), path.display());
                Ok(Retrieved::File {
                    path: path.to_path_buf(),
                    detected_format,
                })
            }
            None => Ok(Retrieved::Bytes {
                data,
                detected_format,
            }),
        }
    }

    /// Tries every locator of `book` in order and returns the first body.
    pub async fn fetch(&self, engine: &dyn Engine, book: &Book) -> Result<Vec<u8>> {
        let mut attempted = Vec::new();
        let mut reasons = Vec::new();

        for locator in book.locators() {
            attempted.push(locator.to_string());
            match self.fetch_one(engine, locator).await {
                Ok(data) => {
                    debug!("Fetched {} bytes via {}", data.len(), locator);
                    return Ok(data);
                }
                Err(e) => {
                    warn!("Locator {} for \"{}\" failed: {}", locator, book.title, e);
                    reasons.push(format!("{locator}: {e}"));
                }
            }
        }

        Err(SearchError::Download {
            source_name: book.source.clone(),
            attempted,
            reasons,
        })
    }

    async fn fetch_one(&self, engine: &dyn Engine, locator: &str) -> Result<Vec<u8>> {
        let url = engine.resolve(locator).await?;
        if url != locator {
            debug!("Resolved {} to {}", locator, url);
        }
        let data = self.fetcher.fetch_bytes(&url).await?;
        if data.is_empty() {
            return Err(SearchError::Other(format!("empty response from {url}")));
        }
        Ok(data)
    }
}

fn check_format(book: &Book, detected: Option<&str>) {
    let Some(detected) = detected else {
        return;
    };
    if detected.eq_ignore_ascii_case(&book.format) {
        return;
    }
    match book.format_origin {
        FormatOrigin::Assumed => warn!(
            "{} assumed \"{}\" is {}, but the download looks like {}",
            book.source, book.title, book.format, detected
        ),
        FormatOrigin::Listed => debug!(
            "{} lists \"{}\" as {}, content looks like {}",
            book.source, book.title, book.format, detected
        ),
    }
}

/// Recognizes common ebook containers from their magic bytes.
pub fn sniff_format(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"%PDF") {
        return Some("pdf");
    }
    if data.len() >= 68 && &data[60..68] == b"BOOKMOBI" {
        return Some("mobi");
    }
    if data.starts_with(b"PK\x03\x04") {
        if data.len() >= 30 + EPUB_MIMETYPE.len() && &data[30..30 + EPUB_MIMETYPE.len()] == EPUB_MIMETYPE {
            return Some("epub");
        }
        return Some("zip");
    }
    None
}

/// Derives a filesystem-safe file name for `book` saved as `format`.
pub fn book_filename(book: &Book, format: &str) -> String {
    let stem = Regex::new(r#"['"`]+"#)
        .and_then(|quotes| {
            let unquoted = quotes.replace_all(book.title.trim(), "");
            Regex::new(r"\W+").map(|sep| sep.replace_all(&unquoted, "-").into_owned())
        })
        .unwrap_or_default();
    let stem = stem.trim_matches('-');
    let stem = if stem.is_empty() { "book" } else { stem };
    format!("{stem}.{format}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::StaticFetcher;
    use crate::{EngineConfig, SearchQuery};
    use async_trait::async_trait;

    /// Resolves `landing:<url>` locators to `<url>`.
    struct LandingEngine {
        config: EngineConfig,
    }

    impl LandingEngine {
        fn new() -> Self {
            Self {
                config: EngineConfig {
                    name: "Landing".to_string(),
                    shortcut: "landing".to_string(),
                    ..Default::default()
                },
            }
        }
    }

    #[async_trait]
    impl Engine for LandingEngine {
        fn config(&self) -> &EngineConfig {
            &self.config
        }

        async fn search(&self, _query: &SearchQuery) -> Result<Vec<Book>> {
            Ok(vec![])
        }

        async fn resolve(&self, locator: &str) -> Result<String> {
            locator
                .strip_prefix("landing:")
                .map(str::to_string)
                .ok_or_else(|| SearchError::Parse(format!("not a landing locator: {locator}")))
        }
    }

    fn mobi_bytes() -> Vec<u8> {
        let mut data = vec![0u8; 60];
        data.extend_from_slice(b"BOOKMOBI");
        data.extend_from_slice(&[0u8; 16]);
        data
    }

    fn search() -> Search {
        let mut search = Search::new();
        search.add_engine(LandingEngine::new());
        search
    }

    #[tokio::test]
    async fn test_retrieve_resolves_then_downloads() {
        let fetcher = StaticFetcher::new().page("http://dl.test/book", mobi_bytes());
        let retriever = Retriever::new(Arc::new(fetcher));
        let book = Book::new("Moby Dick", "Melville", "mobi", "Landing", "landing:http://dl.test/book");

        let retrieved = retriever.retrieve(&search(), &book, None).await.unwrap();

        assert_eq!(
            retrieved,
            Retrieved::Bytes {
                data: mobi_bytes(),
                detected_format: Some("mobi".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_retrieve_falls_back_to_mirror() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .status("http://one.test/book", 503)
                .page("http://two.test/book", "plain text book"),
        );
        let retriever = Retriever::new(fetcher.clone());
        let book = Book::new("t", "a", "txt", "Landing", "landing:http://one.test/book")
            .with_mirror("landing:http://two.test/book");

        let retrieved = retriever.retrieve(&search(), &book, None).await.unwrap();

        assert_eq!(retrieved.detected_format(), None);
        assert_eq!(
            fetcher.requested(),
            vec!["http://one.test/book", "http://two.test/book"]
        );
    }

    #[tokio::test]
    async fn test_retrieve_all_mirrors_fail() {
        let fetcher = StaticFetcher::new()
            .status("http://one.test/book", 500)
            .page("http://three.test/book", Vec::<u8>::new());
        let retriever = Retriever::new(Arc::new(fetcher));
        let book = Book::new("t", "a", "pdf", "Landing", "landing:http://one.test/book")
            .with_mirror("bogus")
            .with_mirror("landing:http://three.test/book");

        let err = retriever.retrieve(&search(), &book, None).await.unwrap_err();

        match err {
            SearchError::Download {
                source_name,
                attempted,
                reasons,
            } => {
                assert_eq!(source_name, "Landing");
                assert_eq!(attempted.len(), 3);
                assert_eq!(reasons.len(), 3);
                assert!(reasons[0].contains("HTTP 500"));
                assert!(reasons[1].contains("not a landing locator"));
                assert!(reasons[2].contains("empty response"));
            }
            other => panic!("expected download error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retrieve_unknown_source() {
        let retriever = Retriever::new(Arc::new(StaticFetcher::new()));
        let book = Book::new("t", "a", "pdf", "Nowhere", "http://x");
        let err = retriever.retrieve(&search(), &book, None).await.unwrap_err();
        assert!(matches!(err, SearchError::UnknownSource(name) if name == "Nowhere"));
    }

    #[tokio::test]
    async fn test_retrieve_writes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("moby.pdf");
        let fetcher = StaticFetcher::new().page("http://dl.test/moby.pdf", "%PDF-1.4 body");
        let retriever = Retriever::new(Arc::new(fetcher));
        let book = Book::new("Moby", "a", "pdf", "Landing", "landing:http://dl.test/moby.pdf");

        let retrieved = retriever
            .retrieve(&search(), &book, Some(&path))
            .await
            .unwrap();

        assert_eq!(
            retrieved,
            Retrieved::File {
                path: path.clone(),
                detected_format: Some("pdf".to_string()),
            }
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 body");
    }

    #[test]
    fn test_sniff_format() {
        assert_eq!(sniff_format(b"%PDF-1.7"), Some("pdf"));
        assert_eq!(sniff_format(&mobi_bytes()), Some("mobi"));

        let mut epub = b"PK\x03\x04".to_vec();
        epub.extend_from_slice(&[0u8; 26]);
        epub.extend_from_slice(EPUB_MIMETYPE);
        assert_eq!(sniff_format(&epub), Some("epub"));

        assert_eq!(sniff_format(b"PK\x03\x04rest"), Some("zip"));
        assert_eq!(sniff_format(b"<html>"), None);
        assert_eq!(sniff_format(b""), None);
    }

    #[test]
    fn test_book_filename() {
        let titled = |title: &str| Book::new(title, "a", "pdf", "LibGen", "u");
        assert_eq!(book_filename(&titled("Moby Dick"), "mobi"), "Moby-Dick.mobi");
        assert_eq!(
            book_filename(&titled("  Hitchhiker's Guide: to the \"Galaxy\" "), "epub"),
            "Hitchhikers-Guide-to-the-Galaxy.epub"
        );
        assert_eq!(book_filename(&titled("???"), "pdf"), "book.pdf");
    }
}
