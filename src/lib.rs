//! # booksnake
//!
//! Search several ebook indexes at once, pick a result, download it and
//! optionally convert it and mail it to a Kindle.
//!
//! The pipeline is built from small pieces:
//!
//! - [`Engine`] implementations in [`engines`] scrape one index each
//! - [`Search`] runs them concurrently and merges their [`Book`]s
//! - [`select`] renders the merged list and picks one entry
//! - [`Retriever`] downloads the chosen book, falling back to mirrors
//! - [`convert::Converter`] and [`deliver::Deliverer`] finish the trip
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use booksnake::{engines::Gutenberg, HttpFetcher, Search, SearchQuery};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(30), None)?);
//!     let mut search = Search::new();
//!     search.add_engine(Gutenberg::new(fetcher));
//!
//!     let results = search.search(SearchQuery::new("moby dick")).await?;
//!     for book in results.items() {
//!         println!("{} by {} [{}]", book.title, book.author, book.format);
//!     }
//!     Ok(())
//! }
//! ```

mod aggregator;
mod engine;
mod error;
mod fetcher;
mod fetcher_http;
mod query;
mod result;
mod retrieve;
mod search;

pub mod convert;
pub mod deliver;
pub mod engines;
pub mod select;
pub mod settings;

pub use aggregator::{partition_preferred, Aggregator};
pub use engine::{Engine, EngineConfig};
pub use error::{
    DeliveryError, Result, SearchError, EXIT_CANCELLED, EXIT_CONVERSION_FAILED,
    EXIT_DELIVERY_FAILED, EXIT_DOWNLOAD_FAILED, EXIT_FAILURE, EXIT_NO_RESULTS,
};
pub use fetcher::PageFetcher;
pub use fetcher_http::HttpFetcher;
pub use query::SearchQuery;
pub use result::{Book, EngineFailure, FormatOrigin, SearchResults, UNKNOWN_AUTHOR, UNKNOWN_SIZE};
pub use retrieve::{book_filename, sniff_format, Retrieved, Retriever};
pub use search::Search;
pub use settings::Settings;
