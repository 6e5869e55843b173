//! Book result types.

use serde::{Deserialize, Serialize};

/// Author shown when a source page does not name one.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Size shown when a source page does not list one.
pub const UNKNOWN_SIZE: &str = "unknown";

/// Where a book's format tag came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatOrigin {
    /// Read from the source page.
    #[default]
    Listed,
    /// Hardcoded by the engine; the file may turn out to be something else.
    Assumed,
}

/// A single candidate book returned by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Book title (may be empty).
    pub title: String,
    /// Book author.
    pub author: String,
    /// Lower-case extension-like format tag, e.g. "mobi".
    pub format: String,
    /// Whether `format` was listed or guessed.
    pub format_origin: FormatOrigin,
    /// Display name of the engine that found the book.
    pub source: String,
    /// Primary retrieval handle, only meaningful to the originating engine.
    pub locator: String,
    /// Fallback locators tried after `locator`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,
    /// Human-readable size.
    pub size: Option<String>,
}

impl Book {
    /// Creates a new book with a listed format and no size.
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        format: impl Into<String>,
        source: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        let author = author.into();
        Self {
            title: title.into(),
            author: if author.trim().is_empty() {
                UNKNOWN_AUTHOR.to_string()
            } else {
                author
            },
            format: format.into().trim().to_lowercase(),
            format_origin: FormatOrigin::Listed,
            source: source.into(),
            locator: locator.into(),
            mirrors: Vec::new(),
            size: None,
        }
    }

    /// Marks the format as a guess made by the engine.
    pub fn assumed_format(mut self) -> Self {
        self.format_origin = FormatOrigin::Assumed;
        self
    }

    /// Sets the human-readable size. Blank values are treated as absent.
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        let size = size.into();
        let size = size.trim();
        self.size = if size.is_empty() {
            None
        } else {
            Some(size.to_string())
        };
        self
    }

    /// Adds a fallback locator.
    pub fn with_mirror(mut self, mirror: impl Into<String>) -> Self {
        self.mirrors.push(mirror.into());
        self
    }

    /// Returns the size, or the "unknown" sentinel.
    pub fn size_or_unknown(&self) -> &str {
        self.size.as_deref().unwrap_or(UNKNOWN_SIZE)
    }

    /// Returns every locator in the order they should be tried.
    pub fn locators(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.locator.as_str()).chain(self.mirrors.iter().map(String::as_str))
    }

    /// Whether the format is one of `formats` (case-insensitive).
    pub fn has_format(&self, formats: &[String]) -> bool {
        formats.iter().any(|f| f.eq_ignore_ascii_case(&self.format))
    }
}

/// An engine that could not contribute to a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFailure {
    /// Engine name.
    pub engine: String,
    /// Why it failed.
    pub reason: String,
}

/// Container for aggregated search results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    /// Books in presentation order.
    results: Vec<Book>,
    /// Engines that failed.
    failures: Vec<EngineFailure>,
    /// Shortcuts of engines that asked to be suspended.
    suspended: Vec<String>,
    /// Number of results.
    pub count: usize,
    /// Search duration in milliseconds.
    pub duration_ms: u64,
}

impl SearchResults {
    /// Creates a container from already-ordered books.
    pub fn from_books(results: Vec<Book>) -> Self {
        Self {
            count: results.len(),
            results,
            ..Self::default()
        }
    }

    /// Records a failed engine.
    pub fn add_failure(&mut self, engine: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(EngineFailure {
            engine: engine.into(),
            reason: reason.into(),
        });
    }

    /// Records an engine that asked to be suspended.
    pub fn add_suspended(&mut self, shortcut: impl Into<String>) {
        self.suspended.push(shortcut.into());
    }

    /// Returns the books.
    pub fn items(&self) -> &[Book] {
        &self.results
    }

    /// Consumes the container and returns the books.
    pub fn into_items(self) -> Vec<Book> {
        self.results
    }

    /// Returns the engine failures.
    pub fn failures(&self) -> &[EngineFailure] {
        &self.failures
    }

    /// Returns the shortcuts of suspended engines.
    pub fn suspended(&self) -> &[String] {
        &self.suspended
    }

    /// Whether no engine returned anything.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Sets the search duration.
    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }
}
