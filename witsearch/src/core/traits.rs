use async_trait::async_trait;
use sea_orm::DbErr;
use uuid::Uuid;

use crate::errors::SearchError;
use crate::models::SearchPage;

/// Work item search over a storage engine.
#[async_trait]
pub trait SearchRepository: Send + Sync {
    /// List work items matching a JSON filter, newest execution order first.
    ///
    /// # Errors
    ///
    /// Returns a bad parameter error for malformed filters or pagination, an
    /// internal error when a joined column is missing from the schema, and a
    /// database error when the query fails.
    async fn filter(
        &self,
        raw_filter: &str,
        start: Option<i64>,
        limit: Option<i64>,
    ) -> Result<SearchPage, SearchError>;

    /// Full-text search ranked by relevance, then by last update.
    ///
    /// # Errors
    ///
    /// Returns a bad parameter error for unusable search strings or
    /// pagination, and a database error when the query fails.
    async fn search_full_text(
        &self,
        raw_search: &str,
        start: Option<i64>,
        limit: Option<i64>,
        space_id: Option<Uuid>,
    ) -> Result<SearchPage, SearchError>;
}

/// Answers whether a table has a column.
#[async_trait]
pub trait ColumnCatalog: Send + Sync {
    async fn has_column(&self, table: &str, column: &str) -> Result<bool, DbErr>;
}
