//! HTTP surface for work item search.
//!
//! ```rust,ignore
//! let repository: Arc<dyn SearchRepository> = Arc::new(SeaOrmSearchRepository::new(Arc::new(db), config, known_urls));
//! let (router, api) = witsearch::routes::router(repository).split_for_parts();
//! ```

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use std::sync::Arc;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::core::traits::SearchRepository;
use crate::database::schema::WORK_ITEMS_TABLE;
use crate::errors::SearchError;
use crate::filtering::pagination::calculate_content_range;
use crate::models::{SearchParams, WorkItemRecord};

/// Search work items by JSON filter or free text.
///
/// `filter` takes precedence over `q`. The total number of matches is
/// reported in the `Content-Range` header.
#[utoipa::path(
    get,
    path = "/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching work items", body = [WorkItemRecord]),
        (status = 400, description = "Malformed filter, search string or pagination"),
        (status = 500, description = "Search could not be executed")
    ),
    tag = "search"
)]
pub async fn search_work_items(
    State(repository): State<Arc<dyn SearchRepository>>,
    Query(params): Query<SearchParams>,
) -> Result<(HeaderMap, Json<Vec<WorkItemRecord>>), SearchError> {
    let page = if let Some(filter) = params.filter.as_deref() {
        repository.filter(filter, params.start, params.limit).await?
    } else if let Some(q) = params.q.as_deref() {
        repository
            .search_full_text(q, params.start, params.limit, params.space_id)
            .await?
    } else {
        return Err(SearchError::bad_parameter_because(
            "filter",
            "",
            "either 'filter' or 'q' is required",
        ));
    };

    let offset = params
        .start
        .and_then(|start| u64::try_from(start).ok())
        .unwrap_or_default();
    let returned = u64::try_from(page.items.len()).unwrap_or(u64::MAX);
    let headers = calculate_content_range(offset, returned, page.total_count, WORK_ITEMS_TABLE);

    Ok((headers, Json(page.items)))
}

/// Router serving [`search_work_items`] at `/search`
pub fn router(repository: Arc<dyn SearchRepository>) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(search_work_items))
        .with_state(repository)
}
