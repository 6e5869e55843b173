//! Search query representation.

use serde::{Deserialize, Serialize};

/// A search query with engine selection and format preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The search terms.
    pub query: String,
    /// Engines to use (by shortcut). Empty means every enabled engine.
    /// Listed engines run even when disabled.
    pub engines: Vec<String>,
    /// Engines to skip (by shortcut).
    pub exclude: Vec<String>,
    /// Formats to move to the front of the result list.
    pub preferred_formats: Vec<String>,
}

impl SearchQuery {
    /// Creates a new search query with the given terms.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Sets specific engines to use.
    pub fn with_engines(mut self, engines: Vec<String>) -> Self {
        self.engines = engines;
        self
    }

    /// Sets engines to skip.
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Sets the preferred formats.
    pub fn with_preferred_formats(mut self, formats: Vec<String>) -> Self {
        self.preferred_formats = formats;
        self
    }

    /// Returns the terms escaped for a query string, spaces as `+`.
    pub fn form_encoded(&self) -> String {
        self.query
            .split_whitespace()
            .map(|word| urlencoding::encode(word).into_owned())
            .collect::<Vec<_>>()
            .join("+")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_new() {
        let query = SearchQuery::new("moby dick");
        assert_eq!(query.query, "moby dick");
        assert!(query.engines.is_empty());
        assert!(query.exclude.is_empty());
        assert!(query.preferred_formats.is_empty());
    }

    #[test]
    fn test_search_query_builder_chain() {
        let query = SearchQuery::new("dune")
            .with_engines(vec!["libgen".to_string()])
            .with_exclude(vec!["gutenberg".to_string()])
            .with_preferred_formats(vec!["mobi".to_string()]);
        assert_eq!(query.engines, vec!["libgen"]);
        assert_eq!(query.exclude, vec!["gutenberg"]);
        assert_eq!(query.preferred_formats, vec!["mobi"]);
    }

    #[test]
    fn test_form_encoded_spaces() {
        let query = SearchQuery::new("Moby  Dick");
        assert_eq!(query.form_encoded(), "Moby+Dick");
    }

    #[test]
    fn test_form_encoded_reserved() {
        let query = SearchQuery::new("War & Peace?");
        assert_eq!(query.form_encoded(), "War+%26+Peace%3F");
    }

    #[test]
    fn test_search_query_deserialization() {
        let json = r#"{"query":"test","engines":[],"exclude":["x"],"preferred_formats":[]}"#;
        let query: SearchQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.query, "test");
        assert_eq!(query.exclude, vec!["x"]);
    }
}
