//! Result aggregation and format preference ordering.

use crate::Book;

/// Merges per-engine result lists into one presentation order.
///
/// Results are concatenated in engine order and keep each engine's page
/// order. Preferred formats, if any, are moved to the front with a stable
/// partition, so relative order inside each group never changes.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    preferred_formats: Vec<String>,
}

impl Aggregator {
    /// Creates a new aggregator with no format preference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the formats that should be listed first.
    pub fn set_preferred_formats(&mut self, formats: Vec<String>) {
        self.preferred_formats = formats;
    }

    /// Returns the preferred formats.
    pub fn preferred_formats(&self) -> &[String] {
        &self.preferred_formats
    }

    /// Aggregates results from multiple engines.
    pub fn aggregate(&self, engine_results: Vec<(String, Vec<Book>)>) -> Vec<Book> {
        let merged: Vec<Book> = engine_results
            .into_iter()
            .flat_map(|(_, results)| results)
            .collect();

        partition_preferred(merged, &self.preferred_formats)
    }
}

/// Stable partition: books in a preferred format first, the rest after.
pub fn partition_preferred(books: Vec<Book>, preferred: &[String]) -> Vec<Book> {
    if preferred.is_empty() {
        return books;
    }
    let (mut first, rest): (Vec<Book>, Vec<Book>) =
        books.into_iter().partition(|book| book.has_format(preferred));
    first.extend(rest);
    first
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, format: &str) -> Book {
        Book::new(title, "author", format, "stub", format!("http://x/{title}"))
    }

    fn titles(books: &[Book]) -> Vec<&str> {
        books.iter().map(|b| b.title.as_str()).collect()
    }

    #[test]
    fn test_aggregate_empty_results() {
        let aggregator = Aggregator::new();
        assert!(aggregator.aggregate(vec![]).is_empty());
    }

    #[test]
    fn test_aggregate_concatenates_in_engine_order() {
        let aggregator = Aggregator::new();
        let merged = aggregator.aggregate(vec![
            ("one".to_string(), vec![book("a", "pdf"), book("b", "epub")]),
            ("two".to_string(), vec![]),
            ("three".to_string(), vec![book("c", "mobi")]),
        ]);
        assert_eq!(titles(&merged), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_partition_is_stable() {
        let books = vec![book("A", "x"), book("B", "y"), book("C", "x")];
        let ordered = partition_preferred(books, &["x".to_string()]);
        assert_eq!(titles(&ordered), vec!["A", "C", "B"]);
    }

    #[test]
    fn test_partition_keeps_order_within_rest() {
        let books = vec![
            book("1", "pdf"),
            book("2", "mobi"),
            book("3", "djvu"),
            book("4", "azw"),
            book("5", "epub"),
        ];
        let ordered = partition_preferred(books, &["mobi".to_string(), "azw".to_string()]);
        assert_eq!(titles(&ordered), vec!["2", "4", "1", "3", "5"]);
    }

    #[test]
    fn test_partition_no_preference_is_identity() {
        let books = vec![book("b", "pdf"), book("a", "mobi")];
        let ordered = partition_preferred(books, &[]);
        assert_eq!(titles(&ordered), vec!["b", "a"]);
    }

    #[test]
    fn test_aggregate_applies_preference() {
        let mut aggregator = Aggregator::new();
        aggregator.set_preferred_formats(vec!["MOBI".to_string()]);
        let merged = aggregator.aggregate(vec![
            ("one".to_string(), vec![book("a", "pdf")]),
            ("two".to_string(), vec![book("b", "mobi")]),
        ]);
        assert_eq!(titles(&merged), vec!["b", "a"]);
        assert_eq!(aggregator.preferred_formats(), ["MOBI".to_string()]);
    }
}
