//! Search orchestration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::{Aggregator, Book, Engine, Result, SearchError, SearchQuery, SearchResults};

/// What one engine contributed to a search.
enum EngineOutcome {
    Found(String, Vec<Book>),
    Failed(String, String),
    Suspended(String, String, String),
}

/// Meta search that runs every selected engine and merges their results.
///
/// Engines run concurrently, each under its own time budget, but their
/// results are merged in registration order so the output is deterministic.
/// A failing engine never fails the search: it is logged and listed in
/// [`SearchResults::failures`].
pub struct Search {
    engines: Vec<Arc<dyn Engine>>,
    enabled_overrides: HashMap<String, bool>,
    aggregator: Aggregator,
    timeout_override: Option<Duration>,
}

impl Search {
    /// Creates a new search instance.
    pub fn new() -> Self {
        Self {
            engines: Vec::new(),
            enabled_overrides: HashMap::new(),
            aggregator: Aggregator::new(),
            timeout_override: None,
        }
    }

    /// Adds a search engine.
    pub fn add_engine<E: Engine + 'static>(&mut self, engine: E) {
        self.engines.push(Arc::new(engine));
    }

    /// Adds an already boxed engine.
    pub fn add_boxed(&mut self, engine: Box<dyn Engine>) {
        self.engines.push(Arc::from(engine));
    }

    /// Overrides the per-engine timeout for every engine.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout_override = Some(timeout);
    }

    /// Turns an engine on or off regardless of its default.
    pub fn set_engine_enabled(&mut self, shortcut: impl Into<String>, enabled: bool) {
        self.enabled_overrides.insert(shortcut.into(), enabled);
    }

    /// Returns the number of configured engines.
    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    /// Returns the registered engines in search order.
    pub fn engines(&self) -> &[Arc<dyn Engine>] {
        &self.engines
    }

    /// Finds the engine that produced books with this `source` name.
    pub fn engine_named(&self, name: &str) -> Option<Arc<dyn Engine>> {
        self.engines.iter().find(|e| e.name() == name).cloned()
    }

    /// Whether an engine runs when the query names no engines.
    pub fn is_engine_enabled(&self, engine: &dyn Engine) -> bool {
        self.enabled_overrides
            .get(engine.shortcut())
            .copied()
            .unwrap_or_else(|| engine.is_enabled())
    }

    /// Performs a search across all selected engines.
    pub async fn search(&self, query: SearchQuery) -> Result<SearchResults> {
        if self.engines.is_empty() {
            return Err(SearchError::NoEngines);
        }

        if query.query.trim().is_empty() {
            return Err(SearchError::InvalidQuery("Query cannot be empty".into()));
        }

        let start = Instant::now();
        let query = Arc::new(query);

        let engines_to_use = self.select_engines(&query);
        debug!("Searching {} engines", engines_to_use.len());

        let futures: Vec<_> = engines_to_use
            .iter()
            .map(|engine| {
                let engine = Arc::clone(engine);
                let query = Arc::clone(&query);
                let timeout_duration = self.timeout_override.unwrap_or_else(|| engine.timeout());

                async move {
                    let name = engine.name().to_string();
                    match timeout(timeout_duration, engine.search(&query)).await {
                        Ok(Ok(results)) => {
                            debug!("Engine {} returned {} results", name, results.len());
                            EngineOutcome::Found(name, results)
                        }
                        Ok(Err(SearchError::EngineSuspended(_, reason))) => {
                            warn!("Engine {} is suspending itself: {}", name, reason);
                            EngineOutcome::Suspended(name, engine.shortcut().to_string(), reason)
                        }
                        Ok(Err(e)) => {
                            warn!("Engine {} failed: {}", name, e);
                            EngineOutcome::Failed(name, e.to_string())
                        }
                        Err(_) => {
                            warn!("Engine {} timed out", name);
                            EngineOutcome::Failed(
                                name,
                                format!("timed out after {}s", timeout_duration.as_secs()),
                            )
                        }
                    }
                }
            })
            .collect();

        let mut found = Vec::new();
        let mut failures = Vec::new();
        let mut suspended = Vec::new();
        for outcome in join_all(futures).await {
            match outcome {
                EngineOutcome::Found(name, results) => found.push((name, results)),
                EngineOutcome::Failed(name, reason) => failures.push((name, reason)),
                EngineOutcome::Suspended(name, shortcut, reason) => {
                    failures.push((name, reason));
                    suspended.push(shortcut);
                }
            }
        }

        let mut aggregator = self.aggregator.clone();
        aggregator.set_preferred_formats(query.preferred_formats.clone());

        let mut search_results = SearchResults::from_books(aggregator.aggregate(found));
        for (name, reason) in failures {
            search_results.add_failure(name, reason);
        }
        for shortcut in suspended {
            search_results.add_suspended(shortcut);
        }
        search_results.set_duration(start.elapsed().as_millis() as u64);

        Ok(search_results)
    }

    /// Selects engines based on query parameters.
    fn select_engines(&self, query: &SearchQuery) -> Vec<Arc<dyn Engine>> {
        self.engines
            .iter()
            .filter(|engine| {
                let shortcut = engine.shortcut();
                if query.exclude.iter().any(|s| s == shortcut) {
                    return false;
                }

                if !query.engines.is_empty() {
                    return query.engines.iter().any(|s| s == shortcut);
                }

                self.is_engine_enabled(engine.as_ref())
            })
            .cloned()
            .collect()
    }
}

impl Default for Search {
    fn default() -> Self {
        Self::new()
    }
}
