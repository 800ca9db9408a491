use chrono::{DateTime, Utc};
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// A `work_items` row as returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult, ToSchema)]
pub struct WorkItemRecord {
    pub id: Uuid,
    pub number: i32,
    #[serde(rename = "type")]
    pub type_id: Uuid,
    pub space_id: Uuid,
    pub version: i32,
    #[schema(value_type = Object)]
    pub fields: serde_json::Value,
    pub execution_order: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Selected columns, aliased to the [`WorkItemRecord`] field names
pub(crate) const WORK_ITEM_COLUMNS: &str = r#""work_items"."id", "work_items"."number", "work_items"."type" AS "type_id", "work_items"."space_id", "work_items"."version", "work_items"."fields", "work_items"."execution_order", "work_items"."created_at", "work_items"."updated_at""#;

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct SearchPage {
    pub items: Vec<WorkItemRecord>,
    /// Matches across all pages
    pub total_count: u64,
}

/// Query parameters for the search endpoint
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// JSON filter, e.g. `{"$AND":[{"space":"..."},{"system.state":"new"}]}`
    pub filter: Option<String>,
    /// Free-text search; supports `number:<n>` and `type:<uuid>` tokens
    pub q: Option<String>,
    /// Index of the first item to return
    pub start: Option<i64>,
    /// Maximum number of items to return
    pub limit: Option<i64>,
    /// Restrict free-text search to one space
    pub space_id: Option<Uuid>,
}
