//! Free-text search tokenization.
//!
//! A raw search string is split on whitespace and every token lands in one of
//! three groups:
//!
//! - `number:<n>` tokens, matched as prefixes with the highest weight
//! - `type:<uuid>` tokens, which restrict results to a type hierarchy
//! - everything else, including URLs resolved through the [`KnownUrlRegistry`]
//!
//! [`SearchKeywords::to_tsquery`] joins the number and word groups into the
//! text passed to `to_tsquery`.

use std::borrow::Cow;
use url::{Host, Url};
use uuid::Uuid;

use super::known_urls::KnownUrlRegistry;
use crate::errors::SearchError;

const NUMBER_PREFIX: &str = "number:";
const TYPE_PREFIX: &str = "type:";
const MAX_URL_LENGTH: usize = 2083;

/// Tokens extracted from a search string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchKeywords {
    pub work_item_types: Vec<Uuid>,
    pub numbers: Vec<String>,
    pub words: Vec<String>,
}

impl SearchKeywords {
    /// Text search query combining every number and word token with `&`
    #[must_use]
    pub fn to_tsquery(&self) -> String {
        let numbers = self.numbers.join(" & ");
        let words = self.words.join(" & ");
        match (numbers.is_empty(), words.is_empty()) {
            (false, false) => format!("{numbers} & {words}"),
            (false, true) => numbers,
            _ => words,
        }
    }
}

/// Characters `to_tsquery` reads as operators, quoting or escapes
const TSQUERY_OPERATORS: &[char] = &['&', '|', '!', '<', '>', '\'', '\\', '*'];

/// Escape the label and grouping characters `to_tsquery` treats as syntax
fn escape_search_delimiters(input: &str) -> String {
    input
        .replace(':', "\\:")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// Prefix-match terms for a piece of search text.
///
/// Whitespace and operator characters split the text; every remaining piece
/// is escaped and suffixed with `:*` and `weight`. Text made only of
/// operators yields no terms.
pub(crate) fn prefix_terms(text: &str, weight: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || TSQUERY_OPERATORS.contains(&c))
        .filter(|piece| !piece.is_empty())
        .map(|piece| format!("{}:*{weight}", escape_search_delimiters(piece)))
        .collect()
}

fn trim_protocol(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

fn is_host_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_domain_with_tld(domain: &str) -> bool {
    let Some((labels, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
        && labels.split('.').all(is_host_label)
}

/// Whether a token should be treated as a URL.
///
/// The protocol is optional; the host has to be `localhost`, an IP literal or
/// a domain ending in an alphabetic top-level domain.
fn looks_like_url(token: &str) -> bool {
    if token.len() < 3
        || token.len() >= MAX_URL_LENGTH
        || token.starts_with('.')
        || token.chars().any(char::is_whitespace)
    {
        return false;
    }

    let lower = token.to_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        Cow::Borrowed(token)
    } else if lower.contains("://") {
        return false;
    } else {
        Cow::Owned(format!("http://{token}"))
    };

    let Ok(parsed) = Url::parse(&candidate) else {
        return false;
    };
    match parsed.host() {
        Some(Host::Domain(domain)) => domain == "localhost" || is_domain_with_tld(domain),
        Some(Host::Ipv4(_) | Host::Ipv6(_)) => true,
        None => false,
    }
}

/// Query-unescape a token; undecodable tokens are used as they are.
fn decode_token(token: &str) -> String {
    let spaced = token.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(err) => {
            tracing::warn!(token, error = %err, "could not decode search token, using it verbatim");
            token.to_string()
        }
    }
}

/// Split a raw search string into [`SearchKeywords`].
///
/// # Errors
///
/// Returns [`SearchError::BadParameter`] for strings longer than
/// `max_length`, and for `type:` or `number:` tokens without a usable value.
pub fn parse_search_string(
    raw: &str,
    known_urls: &KnownUrlRegistry,
    max_length: usize,
) -> Result<SearchKeywords, SearchError> {
    if raw.len() > max_length {
        return Err(SearchError::bad_parameter_because(
            "q",
            format!("{} bytes", raw.len()),
            format!("search strings may be at most {max_length} bytes"),
        ));
    }

    let trimmed = raw.trim_matches('/').trim_matches('"');
    let mut keywords = SearchKeywords::default();

    // decoding can produce new whitespace, so decoded tokens are split again
    let decoded: Vec<String> = trimmed.split_whitespace().map(decode_token).collect();
    for token in decoded.iter().flat_map(|token| token.split_whitespace()) {
        if let Some(number) = token.strip_prefix(NUMBER_PREFIX) {
            let terms = prefix_terms(number, "A");
            if terms.is_empty() {
                return Err(SearchError::bad_parameter_because(
                    "number",
                    token,
                    "number must not be empty",
                ));
            }
            keywords.numbers.extend(terms);
        } else if let Some(type_id) = token.strip_prefix(TYPE_PREFIX) {
            if type_id.is_empty() {
                return Err(SearchError::bad_parameter_because(
                    "type",
                    token,
                    "Type ID must not be empty",
                ));
            }
            let type_id = Uuid::parse_str(type_id).map_err(|err| {
                SearchError::bad_parameter_because(
                    "type",
                    type_id,
                    format!("failed to parse type ID string as UUID: {err}"),
                )
            })?;
            keywords.work_item_types.push(type_id);
        } else if looks_like_url(token) {
            let url = token.to_lowercase();
            let url = trim_protocol(&url);
            match known_urls.search_query_for(url) {
                Some(query) if !query.is_empty() => keywords.words.push(query),
                Some(_) => {}
                None => keywords.words.extend(prefix_terms(url, "")),
            }
        } else {
            keywords.words.extend(prefix_terms(&token.to_lowercase(), ""));
        }
    }

    tracing::info!(
        numbers = ?keywords.numbers,
        words = ?keywords.words,
        types = ?keywords.work_item_types,
        "search keywords"
    );
    Ok(keywords)
}
