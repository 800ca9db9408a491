//! Runtime configuration for the search engine.
//!
//! ```rust,ignore
//! let config = SearchConfig::from_json(r#"{"max_page_size": 100, "work_item_url_host": "demo.example"}"#)?;
//! let known_urls = KnownUrlRegistry::from_config(&config)?;
//! ```

use serde::Deserialize;
use std::time::Duration;

/// Text search configuration used when none is configured
pub const FULLTEXT_LANGUAGE: &str = "english";

/// A named URL pattern registered into the known-URL registry at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KnownUrlConfig {
    pub name: String,
    /// Regular expression matched against the lower-cased, protocol-less URL
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// `PostgreSQL` text search configuration passed to `to_tsquery`
    pub fulltext_language: String,
    /// Maximum nesting of `$AND`/`$OR` objects in a filter
    pub max_filter_depth: usize,
    /// Maximum byte length of a free-text search string
    pub max_search_length: usize,
    /// Largest accepted `limit`; `None` accepts any positive limit
    pub max_page_size: Option<u64>,
    /// Upper bound on a single storage call, in milliseconds
    pub query_timeout_ms: Option<u64>,
    /// Host of the web UI; registers the work item detail URL shapes when set
    pub work_item_url_host: Option<String>,
    /// Additional URL shapes to recognise in search input
    pub known_urls: Vec<KnownUrlConfig>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fulltext_language: FULLTEXT_LANGUAGE.to_string(),
            max_filter_depth: 32,
            max_search_length: 10_000,
            max_page_size: None,
            query_timeout_ms: None,
            work_item_url_host: None,
            known_urls: Vec::new(),
        }
    }
}

impl SearchConfig {
    /// Parse a configuration document; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error for malformed JSON or mistyped values.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    #[must_use]
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}
