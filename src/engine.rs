//! Site adapter trait and configuration.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Book, Result, SearchQuery};

/// Configuration for a site adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Display name of the engine, stored in `Book::source`.
    pub name: String,
    /// Short identifier used on the command line and in settings.
    pub shortcut: String,
    /// Base URL of the site.
    pub base_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Whether the engine runs when no engines are named explicitly.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout() -> u64 {
    10
}

fn default_enabled() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            shortcut: String::new(),
            base_url: String::new(),
            timeout: default_timeout(),
            enabled: true,
        }
    }
}

impl EngineConfig {
    /// Joins a path onto the base URL.
    pub fn url(&self, suffix: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            suffix.trim_start_matches('/')
        )
    }
}

/// Trait for implementing book source adapters.
///
/// `search` returns an empty list when the site has nothing, and
/// `SearchError::EngineSuspended` when the site is rate limiting us.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Returns the engine configuration.
    fn config(&self) -> &EngineConfig;

    /// Performs a search and returns candidate books in page order.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Book>>;

    /// Turns one of this engine's locators into a direct download URL.
    async fn resolve(&self, locator: &str) -> Result<String> {
        Ok(locator.to_string())
    }

    /// Returns the engine name.
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Returns the engine shortcut.
    fn shortcut(&self) -> &str {
        &self.config().shortcut
    }

    /// Returns whether the engine is enabled.
    fn is_enabled(&self) -> bool {
        self.config().enabled
    }

    /// Returns the per-search time budget.
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config().timeout)
    }
}
