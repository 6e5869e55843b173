//! Book source adapters.

use std::sync::Arc;

use scraper::{ElementRef, Selector};
use url::Url;

use crate::fetcher::PageFetcher;
use crate::{Engine, Result, SearchError};

mod gutenberg;
mod libgen;
mod libgen_fiction;
mod librelib;
mod manybooks;

pub use gutenberg::Gutenberg;
pub use libgen::LibGen;
pub use libgen_fiction::LibGenFiction;
pub use librelib::LibreLib;
pub use manybooks::ManyBooks;

/// Shortcuts of every built-in engine, in default search order.
pub const ALL_SHORTCUTS: [&str; 5] = ["libgen", "manybooks", "gutenberg", "libgen-fiction", "librelib"];

/// Maps a shortcut or its alias to the canonical shortcut.
pub fn canonical_shortcut(alias: &str) -> Option<&'static str> {
    let shortcut = match alias.trim().to_ascii_lowercase().as_str() {
        "libgen" | "lg" => "libgen",
        "manybooks" | "mb" => "manybooks",
        "gutenberg" | "pg" => "gutenberg",
        "libgen-fiction" | "lgf" => "libgen-fiction",
        "librelib" | "ll" => "librelib",
        _ => return None,
    };
    Some(shortcut)
}

/// Builds a built-in engine from its shortcut.
pub fn by_shortcut(shortcut: &str, fetcher: Arc<dyn PageFetcher>) -> Option<Box<dyn Engine>> {
    let engine: Box<dyn Engine> = match canonical_shortcut(shortcut)? {
        "libgen" => Box::new(LibGen::new(fetcher)),
        "manybooks" => Box::new(ManyBooks::new(fetcher)),
        "gutenberg" => Box::new(Gutenberg::new(fetcher)),
        "libgen-fiction" => Box::new(LibGenFiction::new(fetcher)),
        _ => Box::new(LibreLib::new(fetcher)),
    };
    Some(engine)
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| SearchError::Parse(format!("Failed to parse selector: {:?}", e)))
}

pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Resolves `href` against the page it was found on.
pub(crate) fn absolute(page_url: &str, href: &str) -> Result<String> {
    Ok(Url::parse(page_url)?.join(href)?.to_string())
}

/// Moves `url` onto another host, keeping path and query.
pub(crate) fn rebase(url: &str, base: &str) -> Result<String> {
    let original = Url::parse(url)?;
    let mut rebased = Url::parse(base)?.join(original.path())?;
    rebased.set_query(original.query());
    Ok(rebased.to_string())
}
