//! Persistent user settings (`~/.booksnakerc`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::deliver::{DEFAULT_SMTP_PORT, DEFAULT_SMTP_SERVER};
use crate::{Result, Search, SearchError, SearchResults};

/// Settings file name inside the home directory.
pub const SETTINGS_FILE: &str = ".booksnakerc";

const SEARCHER_PREFIX: &str = "searchers.";

/// Formats preferred when nothing is configured.
pub const DEFAULT_PREFERRED_FORMATS: [&str; 3] = ["mobi", "azw", "txt"];

/// User settings stored as a flat JSON object.
///
/// Engine switches live under `searchers.<shortcut>` keys. Keys this
/// version does not know about are kept and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Sender address and SMTP login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_email: Option<String>,
    /// Kindle address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_email: Option<String>,
    /// SMTP password; prompted for when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_password: Option<String>,
    /// SMTP relay host; Gmail when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_server: Option<String>,
    /// SMTP submission port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_port: Option<u16>,
    /// Formats listed first in results and picked by `--auto`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_formats: Option<Vec<String>>,
    /// Conversion program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter: Option<String>,

    #[serde(flatten)]
    extra: BTreeMap<String, Value>,

    #[serde(skip)]
    dirty: bool,
}

impl Settings {
    /// `~/.booksnakerc`, if the home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(SETTINGS_FILE))
    }

    /// Reads settings from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(SearchError::Settings {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&text).map_err(|e| SearchError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Writes the settings to `path` and clears the dirty flag.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        let settings_error = |reason: String| SearchError::Settings {
            path: path.to_path_buf(),
            reason,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| settings_error(e.to_string()))?;
        std::fs::write(path, json + "\n").map_err(|e| settings_error(e.to_string()))?;
        self.dirty = false;
        info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Saves only when something changed since loading. Returns whether it wrote.
    pub fn save_if_dirty(&mut self, path: &Path) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.save(path)?;
        Ok(true)
    }

    /// Whether there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Configured SMTP host or the default relay.
    pub fn smtp_server(&self) -> &str {
        self.smtp_server.as_deref().unwrap_or(DEFAULT_SMTP_SERVER)
    }

    /// Configured SMTP port or 587.
    pub fn smtp_port(&self) -> u16 {
        self.smtp_port.unwrap_or(DEFAULT_SMTP_PORT)
    }

    /// Configured preferred formats, or the Kindle-friendly defaults.
    pub fn preferred_formats(&self) -> Vec<String> {
        match &self.preferred_formats {
            Some(formats) => formats.clone(),
            None => DEFAULT_PREFERRED_FORMATS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Configured conversion program or `ebook-convert`.
    pub fn converter(&self) -> &str {
        self.converter
            .as_deref()
            .unwrap_or(crate::convert::DEFAULT_CONVERTER)
    }

    /// The stored switch for engine `shortcut`, if any.
    pub fn searcher_enabled(&self, shortcut: &str) -> Option<bool> {
        self.extra
            .get(&format!("{SEARCHER_PREFIX}{shortcut}"))
            .and_then(Value::as_bool)
    }

    /// Stores the switch for engine `shortcut`.
    pub fn set_searcher_enabled(&mut self, shortcut: &str, enabled: bool) {
        if self.searcher_enabled(shortcut) == Some(enabled) {
            return;
        }
        self.extra
            .insert(format!("{SEARCHER_PREFIX}{shortcut}"), Value::Bool(enabled));
        self.dirty = true;
    }

    /// Every stored engine switch as `(shortcut, enabled)`.
    pub fn searchers(&self) -> impl Iterator<Item = (&str, bool)> {
        self.extra.iter().filter_map(|(key, value)| {
            let shortcut = key.strip_prefix(SEARCHER_PREFIX)?;
            Some((shortcut, value.as_bool()?))
        })
    }

    /// Pushes the stored engine switches into `search`.
    pub fn apply_to(&self, search: &mut Search) {
        for (shortcut, enabled) in self.searchers() {
            search.set_engine_enabled(shortcut, enabled);
        }
    }

    /// Disables every engine that reported a suspension during `results`.
    ///
    /// Returns whether any switch changed.
    pub fn apply_suspensions(&mut self, results: &SearchResults) -> bool {
        let mut changed = false;
        for shortcut in results.suspended() {
            if self.searcher_enabled(shortcut) != Some(false) {
                info!("Disabling {} in settings until re-enabled", shortcut);
                self.set_searcher_enabled(shortcut, false);
                changed = true;
            }
        }
        changed
    }
}
