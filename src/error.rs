//! Error types for the booksnake library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for booksnake operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Process exit code for failures that are not classified below.
pub const EXIT_FAILURE: i32 = 1;
/// Process exit code when aggregation produced no candidates.
pub const EXIT_NO_RESULTS: i32 = 2;
/// Process exit code when the user declined to pick a result.
pub const EXIT_CANCELLED: i32 = 3;
/// Process exit code when every locator for the chosen book failed.
pub const EXIT_DOWNLOAD_FAILED: i32 = 4;
/// Process exit code when the external converter produced nothing.
pub const EXIT_CONVERSION_FAILED: i32 = 5;
/// Process exit code when the book could not be mailed.
pub const EXIT_DELIVERY_FAILED: i32 = 6;

/// Errors that can occur while searching, retrieving, converting or sending.
#[derive(Error, Debug)]
pub enum SearchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Status code returned.
        status: u16,
    },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Engine is temporarily suspended (rate limited or banned).
    #[error("Engine '{0}' is suspended: {1}")]
    EngineSuspended(String, String),

    /// No engines configured.
    #[error("No search engines configured")]
    NoEngines,

    /// Invalid query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Every engine came back empty.
    #[error("No results for \"{0}\"")]
    NoResults(String),

    /// No result carried one of the wanted formats.
    #[error("No result in any of the formats: {}", .0.join(", "))]
    NoMatchingFormat(Vec<String>),

    /// A result index outside the result list.
    #[error("Result #{index} does not exist ({count} results)")]
    InvalidSelection {
        /// 1-based index requested.
        index: usize,
        /// Number of available results.
        count: usize,
    },

    /// A book refers to an engine that is not registered.
    #[error("No engine named '{0}' is available to retrieve this book")]
    UnknownSource(String),

    /// Every locator for a book failed.
    #[error("Download from {source_name} failed, none of {} locators succeeded: {}", .attempted.len(), .reasons.join("; "))]
    Download {
        /// Engine the book came from.
        source_name: String,
        /// Locators that were tried, in order.
        attempted: Vec<String>,
        /// One reason per attempted locator.
        reasons: Vec<String>,
    },

    /// The external converter did not produce its output.
    #[error("Conversion of {input} failed: {reason}")]
    Conversion {
        /// File handed to the converter.
        input: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Mail delivery failed after the retry policy was exhausted.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// Settings file could not be read or written.
    #[error("Settings error at {path}: {reason}")]
    Settings {
        /// Settings file path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl SearchError {
    /// Maps the error to the process exit code used by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            SearchError::NoResults(_) | SearchError::NoMatchingFormat(_) => EXIT_NO_RESULTS,
            SearchError::InvalidSelection { .. } => EXIT_CANCELLED,
            SearchError::Download { .. } | SearchError::UnknownSource(_) => EXIT_DOWNLOAD_FAILED,
            SearchError::Conversion { .. } => EXIT_CONVERSION_FAILED,
            SearchError::Delivery(_) => EXIT_DELIVERY_FAILED,
            _ => EXIT_FAILURE,
        }
    }
}

/// Classified mail delivery failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The server rejected the credentials.
    #[error("authentication rejected for {user}: {reason}")]
    Auth {
        /// Login that was rejected.
        user: String,
        /// Server response.
        reason: String,
    },

    /// Connection-level or temporary server failure.
    #[error("transient failure talking to {server}: {reason}")]
    Transient {
        /// SMTP server.
        server: String,
        /// Underlying failure.
        reason: String,
    },

    /// Permanent rejection that retrying will not fix.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The message could not be built (bad address, missing field).
    #[error("invalid message: {0}")]
    Message(String),
}

impl DeliveryError {
    /// Whether another attempt could succeed without user input.
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_parse() {
        let err = SearchError::Parse("missing table".to_string());
        assert_eq!(err.to_string(), "Failed to parse response: missing table");
    }

    #[test]
    fn test_error_display_engine_suspended() {
        let err = SearchError::EngineSuspended("Gutenberg".to_string(), "HTTP 429".to_string());
        assert_eq!(err.to_string(), "Engine 'Gutenberg' is suspended: HTTP 429");
    }

    #[test]
    fn test_error_display_http_status() {
        let err = SearchError::HttpStatus {
            url: "http://example.com".to_string(),
            status: 503,
        };
        assert_eq!(err.to_string(), "HTTP 503 from http://example.com");
    }

    #[test]
    fn test_error_display_no_matching_format() {
        let err = SearchError::NoMatchingFormat(vec!["mobi".to_string(), "azw".to_string()]);
        assert_eq!(err.to_string(), "No result in any of the formats: mobi, azw");
    }

    #[test]
    fn test_error_display_download_names_locators() {
        let err = SearchError::Download {
            source_name: "LibGen".to_string(),
            attempted: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            reasons: vec!["a: 404".to_string(), "b: 500".to_string(), "c: empty".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("LibGen"));
        assert!(msg.contains("none of 3 locators"));
        assert!(msg.contains("c: empty"));
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            SearchError::NoResults("q".into()).exit_code(),
            SearchError::Download {
                source_name: String::new(),
                attempted: vec![],
                reasons: vec![],
            }
            .exit_code(),
            SearchError::Conversion {
                input: PathBuf::from("a.epub"),
                reason: "missing".into(),
            }
            .exit_code(),
            SearchError::Delivery(DeliveryError::Rejected("no".into())).exit_code(),
            SearchError::NoEngines.exit_code(),
        ];
        assert_eq!(codes, [2, 4, 5, 6, 1]);
    }

    #[test]
    fn test_delivery_error_transient() {
        let transient = DeliveryError::Transient {
            server: "smtp.example.com".into(),
            reason: "connection reset".into(),
        };
        let auth = DeliveryError::Auth {
            user: "me@example.com".into(),
            reason: "535".into(),
        };
        assert!(transient.is_transient());
        assert!(!auth.is_transient());
    }
}
