use axum::http::{HeaderValue, header::HeaderMap};

use crate::errors::SearchError;

/// A validated page request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl Page {
    /// `LIMIT`/`OFFSET` suffix for a statement; empty when unpaginated
    #[must_use]
    pub fn sql_suffix(&self) -> String {
        let mut suffix = String::new();
        if let Some(limit) = self.limit {
            suffix.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            suffix.push_str(&format!(" OFFSET {offset}"));
        }
        suffix
    }

    /// Whether an empty page could still have matches before it
    #[must_use]
    pub fn skips_rows(&self) -> bool {
        self.offset.is_some_and(|offset| offset > 0)
    }
}

/// Validate optional `start` and `limit` request values.
///
/// Out-of-range values are rejected, never clamped.
///
/// # Errors
///
/// Returns [`SearchError::BadParameter`] for a negative `start`, a `limit`
/// that is not positive, or a `limit` above `max_page_size`.
pub fn validate_pagination(
    start: Option<i64>,
    limit: Option<i64>,
    max_page_size: Option<u64>,
) -> Result<Page, SearchError> {
    let offset = start
        .map(|start| u64::try_from(start).map_err(|_| SearchError::bad_parameter("start", start.to_string())))
        .transpose()?;

    let limit = match limit {
        None => None,
        Some(limit) if limit <= 0 => {
            return Err(SearchError::bad_parameter("limit", limit.to_string()));
        }
        Some(limit) => {
            let limit = limit.unsigned_abs();
            if let Some(max) = max_page_size.filter(|max| limit > *max) {
                return Err(SearchError::bad_parameter_because(
                    "limit",
                    limit.to_string(),
                    format!("at most {max} items may be requested at once"),
                ));
            }
            Some(limit)
        }
    };

    Ok(Page { offset, limit })
}

/// Sanitize resource name by removing control characters for HTTP headers
fn sanitize_resource_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()).collect()
}

/// Build the `Content-Range` header for a page of results.
///
/// `returned` is the number of items in the page. An empty page is reported
/// as `<resource> */<total>`.
#[must_use]
pub fn calculate_content_range(
    offset: u64,
    returned: u64,
    total_count: u64,
    resource_name: &str,
) -> HeaderMap {
    let safe_name = sanitize_resource_name(resource_name);
    let content_range = if returned == 0 {
        format!("{safe_name} */{total_count}")
    } else {
        let last = offset.saturating_add(returned - 1);
        format!("{safe_name} {offset}-{last}/{total_count}")
    };

    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&content_range)
        .unwrap_or_else(|_| HeaderValue::from_static("items */0"));
    headers.insert("Content-Range", value);
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_pagination() {
        assert_eq!(
            validate_pagination(Some(0), Some(10), None).unwrap(),
            Page {
                offset: Some(0),
                limit: Some(10)
            }
        );
        assert_eq!(validate_pagination(None, None, None).unwrap(), Page::default());
    }

    #[test]
    fn test_negative_start_is_rejected() {
        let err = validate_pagination(Some(-1), Some(10), None).unwrap_err();
        assert_eq!(err.to_string(), "Bad value for parameter 'start': '-1'");
    }

    #[test]
    fn test_non_positive_limit_is_rejected() {
        for limit in [0, -5] {
            let err = validate_pagination(Some(0), Some(limit), None).unwrap_err();
            assert!(err.is_bad_parameter());
            assert!(err.to_string().contains("'limit'"));
        }
    }

    #[test]
    fn test_limit_above_ceiling_is_rejected_not_clamped() {
        assert!(validate_pagination(None, Some(100), Some(100)).is_ok());
        let err = validate_pagination(None, Some(101), Some(100)).unwrap_err();
        assert!(err.to_string().contains("at most 100"));
    }

    #[test]
    fn test_sql_suffix() {
        let page = Page {
            offset: Some(20),
            limit: Some(10),
        };
        assert_eq!(page.sql_suffix(), " LIMIT 10 OFFSET 20");
        assert_eq!(Page::default().sql_suffix(), "");
        assert!(page.skips_rows());
        assert!(!Page { offset: Some(0), limit: None }.skips_rows());
    }

    #[test]
    fn test_content_range_normal() {
        let headers = calculate_content_range(0, 10, 100, "work_items");
        let value = headers.get("Content-Range").unwrap().to_str().unwrap();
        assert_eq!(value, "work_items 0-9/100");
    }

    #[test]
    fn test_content_range_short_last_page() {
        let headers = calculate_content_range(20, 3, 23, "work_items");
        let value = headers.get("Content-Range").unwrap().to_str().unwrap();
        assert_eq!(value, "work_items 20-22/23");
    }

    #[test]
    fn test_content_range_empty_page() {
        let headers = calculate_content_range(40, 0, 23, "work_items");
        let value = headers.get("Content-Range").unwrap().to_str().unwrap();
        assert_eq!(value, "work_items */23");
    }

    #[test]
    fn test_content_range_strips_control_characters() {
        let headers = calculate_content_range(0, 1, 1, "items\r\nInjected: evil");
        let value = headers.get("Content-Range").unwrap().to_str().unwrap();
        assert!(!value.contains('\r'));
        assert!(!value.contains('\n'));
    }
}
