//! Registry of recognisable URL shapes.
//!
//! When a search token looks like a URL, the registry decides whether it
//! points at something we know how to search for. A work item detail URL, for
//! example, turns into a query that matches both the bare work item number and
//! the full URL text.

use parking_lot::RwLock;
use regex::{Captures, Regex};

use super::search::prefix_terms;
use crate::config::SearchConfig;

pub const WORK_ITEM_LIST_DETAILS: &str = "work-item-list-details";
pub const WORK_ITEM_BOARD_DETAILS: &str = "work-item-board-details";

/// A registered URL pattern.
#[derive(Debug, Clone)]
pub struct KnownUrl {
    pub name: String,
    pub url_regex: String,
    compiled_regex: Regex,
}

impl KnownUrl {
    /// Names of the pattern's named capture groups, in pattern order
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.compiled_regex.capture_names().flatten()
    }
}

/// Shared, read-mostly set of [`KnownUrl`]s in registration order.
#[derive(Debug, Default)]
pub struct KnownUrlRegistry {
    urls: RwLock<Vec<KnownUrl>>,
}

impl KnownUrlRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding the URL shapes named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns the regex error of the first pattern that does not compile.
    pub fn from_config(config: &SearchConfig) -> Result<Self, regex::Error> {
        let registry = Self::new();

        if let Some(host) = &config.work_item_url_host {
            let host = regex::escape(&host.to_lowercase());
            registry.register(
                WORK_ITEM_LIST_DETAILS,
                &format!(r"^(?P<domain>{host})(?P<path>/work-item/list/detail/)(?P<id>\d*)"),
            )?;
            registry.register(
                WORK_ITEM_BOARD_DETAILS,
                &format!(r"^(?P<domain>{host})(?P<path>/work-item/board/detail/)(?P<id>\d*)"),
            )?;
        }
        for known in &config.known_urls {
            registry.register(&known.name, &known.pattern)?;
        }

        Ok(registry)
    }

    /// Register a pattern; a pattern already registered under `name` is
    /// replaced in place.
    ///
    /// # Errors
    ///
    /// Returns the regex error if `url_regex` does not compile.
    pub fn register(&self, name: &str, url_regex: &str) -> Result<(), regex::Error> {
        let known = KnownUrl {
            name: name.to_string(),
            url_regex: url_regex.to_string(),
            compiled_regex: Regex::new(url_regex)?,
        };

        let mut urls = self.urls.write();
        match urls.iter_mut().find(|existing| existing.name == name) {
            Some(existing) => *existing = known,
            None => urls.push(known),
        }
        tracing::debug!(name, pattern = url_regex, "registered known URL");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<KnownUrl> {
        self.urls.read().iter().find(|known| known.name == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.urls.read().iter().map(|known| known.name.clone()).collect()
    }

    /// Search query fragment for a lower-cased, protocol-less URL.
    ///
    /// The pattern with the most participating capture groups wins; among
    /// equally good matches the earliest registered pattern wins. Returns
    /// `None` when no pattern matches, and an empty fragment when the match
    /// holds nothing searchable.
    pub fn search_query_for(&self, url: &str) -> Option<String> {
        let urls = self.urls.read();
        let mut best: Option<(usize, Captures<'_>)> = None;

        for known in urls.iter() {
            let Some(captures) = known.compiled_regex.captures(url) else {
                continue;
            };
            let participating = captures.iter().skip(1).flatten().count();
            if best.as_ref().is_none_or(|(count, _)| participating > *count) {
                best = Some((participating, captures));
            }
        }

        best.map(|(_, captures)| query_from_captures(&captures))
    }
}

fn query_from_captures(captures: &Captures<'_>) -> String {
    let joined: String = captures
        .iter()
        .skip(1)
        .flatten()
        .map(|group| group.as_str())
        .collect();
    let matched = if joined.is_empty() {
        captures.get(0).map_or("", |whole| whole.as_str())
    } else {
        joined.as_str()
    };
    let path = prefix_terms(matched, "").join(" & ");
    let id = captures
        .name("id")
        .map(|id| prefix_terms(id.as_str(), "").join(" & "))
        .filter(|id| !id.is_empty());

    match id {
        Some(id) if path.is_empty() => id,
        Some(id) => format!("({id} | {path})"),
        None => path,
    }
}
