//! Search repository over a Sea-ORM connection.
//!
//! Both searches select `count(*) OVER ()` as the first column so one round
//! trip returns the page and the total number of matches. Only when a page
//! past the first comes back empty is the total counted separately.

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbErr, FromQueryResult, QueryResult, Statement, Value,
};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use super::traits::{ColumnCatalog, SearchRepository};
use crate::config::SearchConfig;
use crate::database::postgres_statement;
use crate::database::schema::{
    InformationSchemaCatalog, SEARCH_VECTOR_COLUMN, WORK_ITEM_TYPES_TABLE, WORK_ITEMS_TABLE,
    column, quote_identifier,
};
use crate::errors::SearchError;
use crate::filtering::compiler::{CompiledPredicate, compile};
use crate::filtering::known_urls::KnownUrlRegistry;
use crate::filtering::pagination::{Page, validate_pagination};
use crate::filtering::query_parser::parse_filter_string;
use crate::filtering::search::parse_search_string;
use crate::models::{SearchPage, WORK_ITEM_COLUMNS, WorkItemRecord};

const TOTAL_COUNT: &str = "total_count";

/// Page query and stand-alone count query for one search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchStatements {
    pub select: Statement,
    pub count: Statement,
}

fn not_deleted() -> String {
    format!("{} IS NULL", column(WORK_ITEMS_TABLE, "deleted_at"))
}

/// Statements listing the rows matched by a compiled filter.
#[must_use]
pub fn filter_statements(compiled: &CompiledPredicate, page: &Page) -> SearchStatements {
    let joins = compiled.join_clause();
    let from = if joins.is_empty() {
        format!("FROM {}", quote_identifier(WORK_ITEMS_TABLE))
    } else {
        format!("FROM {} {joins}", quote_identifier(WORK_ITEMS_TABLE))
    };
    let from_where = format!(
        "{from} WHERE {} AND ({})",
        not_deleted(),
        compiled.where_clause
    );

    let select = format!(
        "SELECT count(*) OVER () AS {TOTAL_COUNT}, {WORK_ITEM_COLUMNS} {from_where} ORDER BY {} DESC{}",
        column(WORK_ITEMS_TABLE, "execution_order"),
        page.sql_suffix()
    );
    let count = format!("SELECT count(*) AS {TOTAL_COUNT} {from_where}");

    SearchStatements {
        select: postgres_statement(&select, compiled.parameters.clone()),
        count: postgres_statement(&count, compiled.parameters.clone()),
    }
}

/// A full-text search after tokenization
#[derive(Debug, Clone, Copy)]
pub struct FullTextQuery<'a> {
    /// `to_tsquery` text; empty lists every item of `work_item_types`
    pub tsquery: &'a str,
    pub work_item_types: &'a [Uuid],
    pub space_id: Option<Uuid>,
    pub language: &'a str,
}

/// Statements ranking the rows matched by a full-text query.
#[must_use]
pub fn full_text_statements(query: &FullTextQuery<'_>, page: &Page) -> SearchStatements {
    let mut values: Vec<Value> = Vec::new();
    let mut from = format!("FROM {}", quote_identifier(WORK_ITEMS_TABLE));
    let mut conditions = vec![not_deleted()];
    let ranked = !query.tsquery.is_empty();

    if ranked {
        from.push_str(", to_tsquery(CAST(? AS regconfig), ?) AS query");
        values.push(query.language.into());
        values.push(query.tsquery.into());
        conditions.push(format!(
            "{} @@ query",
            column(WORK_ITEMS_TABLE, SEARCH_VECTOR_COLUMN)
        ));
    }

    if !query.work_item_types.is_empty() {
        let placeholders = vec!["?"; query.work_item_types.len()].join(", ");
        conditions.push(format!(
            "{} IN (SELECT DISTINCT {} FROM {types} subtype JOIN {types} supertype ON {} <@ {} WHERE {} IN ({placeholders}))",
            column(WORK_ITEMS_TABLE, "type"),
            column("subtype", "id"),
            column("subtype", "path"),
            column("supertype", "path"),
            column("supertype", "id"),
            types = quote_identifier(WORK_ITEM_TYPES_TABLE),
        ));
        values.extend(query.work_item_types.iter().copied().map(Value::from));
    }

    if let Some(space_id) = query.space_id {
        conditions.push(format!("{} = ?", column(WORK_ITEMS_TABLE, "space_id")));
        values.push(space_id.into());
    }

    let from_where = format!("{from} WHERE {}", conditions.join(" AND "));
    let updated_at = column(WORK_ITEMS_TABLE, "updated_at");
    let (rank, order) = if ranked {
        (
            format!(
                ", ts_rank({}, query) AS rank",
                column(WORK_ITEMS_TABLE, SEARCH_VECTOR_COLUMN)
            ),
            format!("rank DESC, {updated_at} DESC"),
        )
    } else {
        (String::new(), format!("{updated_at} DESC"))
    };

    let select = format!(
        "SELECT count(*) OVER () AS {TOTAL_COUNT}, {WORK_ITEM_COLUMNS}{rank} {from_where} ORDER BY {order}{}",
        page.sql_suffix()
    );
    let count = format!("SELECT count(*) AS {TOTAL_COUNT} {from_where}");

    SearchStatements {
        select: postgres_statement(&select, values.clone()),
        count: postgres_statement(&count, values),
    }
}

fn total_from(row: &QueryResult) -> Result<u64, DbErr> {
    let total: i64 = row.try_get("", TOTAL_COUNT)?;
    Ok(u64::try_from(total).unwrap_or_default())
}

/// [`SearchRepository`] backed by a `PostgreSQL` connection.
#[derive(Clone)]
pub struct SeaOrmSearchRepository {
    db: Arc<DatabaseConnection>,
    config: Arc<SearchConfig>,
    known_urls: Arc<KnownUrlRegistry>,
    catalog: Arc<dyn ColumnCatalog>,
}

impl SeaOrmSearchRepository {
    /// Joined columns are checked against `information_schema` unless another
    /// catalog is set with [`Self::with_column_catalog`].
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<SearchConfig>,
        known_urls: Arc<KnownUrlRegistry>,
    ) -> Self {
        let catalog = Arc::new(InformationSchemaCatalog::new(Arc::clone(&db)));
        Self {
            db,
            config,
            known_urls,
            catalog,
        }
    }

    #[must_use]
    pub fn with_column_catalog(mut self, catalog: Arc<dyn ColumnCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Parse and compile a filter without running it, e.g. before storing it
    /// as a saved query.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::BadParameter`] when the filter does not parse
    /// and [`SearchError::InvalidFilter`] when it does not compile.
    pub fn validate_filter(&self, raw_filter: &str) -> Result<CompiledPredicate, SearchError> {
        let expression = parse_filter_string(raw_filter, self.config.max_filter_depth)?;
        let compiled = compile(&expression)?;
        tracing::debug!(
            %expression,
            where_clause = %compiled.where_clause,
            joins = ?compiled.joins.keys().collect::<Vec<_>>(),
            "compiled filter"
        );
        Ok(compiled)
    }

    async fn bounded<T, F>(&self, query: F) -> Result<T, SearchError>
    where
        F: Future<Output = Result<T, DbErr>> + Send,
    {
        match self.config.query_timeout() {
            Some(limit) => tokio::time::timeout(limit, query)
                .await
                .map_err(|_| {
                    SearchError::internal(
                        "Search took too long",
                        Some(format!("query exceeded {} ms", limit.as_millis())),
                    )
                })?
                .map_err(SearchError::from),
            None => query.await.map_err(SearchError::from),
        }
    }

    async fn fetch_page(
        &self,
        statements: SearchStatements,
        page: &Page,
    ) -> Result<SearchPage, SearchError> {
        let rows = self.bounded(self.db.query_all(statements.select)).await?;

        let mut total_count = None;
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            if total_count.is_none() {
                total_count = Some(total_from(row)?);
            }
            items.push(WorkItemRecord::from_query_result(row, "")?);
        }

        let total_count = match total_count {
            Some(total) => total,
            None if page.skips_rows() => self
                .bounded(self.db.query_one(statements.count))
                .await?
                .map(|row| total_from(&row))
                .transpose()?
                .unwrap_or_default(),
            None => 0,
        };

        Ok(SearchPage { items, total_count })
    }
}

#[async_trait]
impl SearchRepository for SeaOrmSearchRepository {
    async fn filter(
        &self,
        raw_filter: &str,
        start: Option<i64>,
        limit: Option<i64>,
    ) -> Result<SearchPage, SearchError> {
        let page = validate_pagination(start, limit, self.config.max_page_size)?;
        let compiled = self.validate_filter(raw_filter)?;
        for join in compiled.joins.values() {
            join.is_valid(self.catalog.as_ref()).await?;
        }

        let result = self
            .fetch_page(filter_statements(&compiled, &page), &page)
            .await?;
        tracing::info!(
            total = result.total_count,
            returned = result.items.len(),
            "filtered work items"
        );
        Ok(result)
    }

    async fn search_full_text(
        &self,
        raw_search: &str,
        start: Option<i64>,
        limit: Option<i64>,
        space_id: Option<Uuid>,
    ) -> Result<SearchPage, SearchError> {
        let page = validate_pagination(start, limit, self.config.max_page_size)?;
        let keywords =
            parse_search_string(raw_search, &self.known_urls, self.config.max_search_length)?;
        let tsquery = keywords.to_tsquery();

        if tsquery.is_empty() && keywords.work_item_types.is_empty() {
            return Err(SearchError::bad_parameter_because(
                "q",
                raw_search,
                "search needs at least one word, number or type",
            ));
        }

        let query = FullTextQuery {
            tsquery: &tsquery,
            work_item_types: &keywords.work_item_types,
            space_id,
            language: &self.config.fulltext_language,
        };
        let result = self
            .fetch_page(full_text_statements(&query, &page), &page)
            .await?;
        tracing::info!(
            tsquery = %tsquery,
            total = result.total_count,
            returned = result.items.len(),
            "full-text search"
        );
        Ok(result)
    }
}
