/*!
# Work Item Schema

Names of the tables and columns the search engine reads, the fixed set of
physical columns a filter may address directly, and the column catalogs used
to check joined columns against the live database.
*/

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, Statement};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::traits::ColumnCatalog;

pub const WORK_ITEMS_TABLE: &str = "work_items";
pub const WORK_ITEM_TYPES_TABLE: &str = "work_item_types";
/// JSON document column holding every custom field of a work item
pub const FIELDS_COLUMN: &str = "fields";
pub const SEARCH_VECTOR_COLUMN: &str = "tsv";

/// How literals compared against a physical column are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    Integer,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedColumn {
    pub name: &'static str,
    pub kind: ColumnKind,
}

/// Resolve a filter field name to one of the physical `work_items` columns.
#[must_use]
pub fn fixed_column(field: &str) -> Option<FixedColumn> {
    let (name, kind) = match field {
        "ID" | "id" => ("id", ColumnKind::Uuid),
        "Type" | "type" => ("type", ColumnKind::Uuid),
        "Version" | "version" => ("version", ColumnKind::Integer),
        "Number" | "number" => ("number", ColumnKind::Integer),
        "SpaceID" | "space_id" => ("space_id", ColumnKind::Uuid),
        _ => return None,
    };
    Some(FixedColumn { name, kind })
}

/// Quote an identifier for `PostgreSQL`, doubling embedded quotes
#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quote a string literal for `PostgreSQL`.
///
/// Embedded single quotes are doubled. Text holding a backslash is written as
/// an `E'...'` literal with doubled backslashes, which reads the same whether
/// `standard_conforming_strings` is on or off.
#[must_use]
pub fn quote_literal(text: &str) -> String {
    let quoted = text.replace('\'', "''");
    if quoted.contains('\\') {
        format!("E'{}'", quoted.replace('\\', "\\\\"))
    } else {
        format!("'{quoted}'")
    }
}

/// Fully qualified, quoted column reference such as `"work_items"."id"`
#[must_use]
pub fn column(table: &str, column: &str) -> String {
    format!("{}.{}", quote_identifier(table), quote_identifier(column))
}

/// Column catalog backed by `information_schema.columns`.
///
/// Every call asks the database, so a column dropped or renamed since the last
/// search is reported as missing.
pub struct InformationSchemaCatalog {
    db: Arc<DatabaseConnection>,
}

impl InformationSchemaCatalog {
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ColumnCatalog for InformationSchemaCatalog {
    async fn has_column(&self, table: &str, column: &str) -> Result<bool, DbErr> {
        let statement = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            r"SELECT count(*) AS column_count
              FROM information_schema.columns
              WHERE table_schema = current_schema()
              AND table_name = $1
              AND column_name = $2",
            [table.into(), column.into()],
        );
        match self.db.query_one(statement).await? {
            Some(row) => Ok(row.try_get::<i64>("", "column_count")? > 0),
            None => Ok(false),
        }
    }
}

/// Column catalog over a fixed table description.
#[derive(Debug, Clone, Default)]
pub struct StaticColumnCatalog {
    tables: HashMap<String, HashSet<String>>,
}

impl StaticColumnCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_table<I, S>(mut self, table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .entry(table.to_string())
            .or_default()
            .extend(columns.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl ColumnCatalog for StaticColumnCatalog {
    async fn has_column(&self, table: &str, column: &str) -> Result<bool, DbErr> {
        Ok(self
            .tables
            .get(table)
            .is_some_and(|columns| columns.contains(column)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{MockDatabase, Value};
    use std::collections::BTreeMap;

    #[test]
    fn test_fixed_column_aliases() {
        assert_eq!(fixed_column("SpaceID").map(|c| c.name), Some("space_id"));
        assert_eq!(fixed_column("space_id").map(|c| c.kind), Some(ColumnKind::Uuid));
        assert_eq!(fixed_column("ID").map(|c| c.kind), Some(ColumnKind::Uuid));
        assert_eq!(fixed_column("number").map(|c| c.kind), Some(ColumnKind::Integer));
        // plain "space" is a document key like any other
        assert_eq!(fixed_column("space"), None);
        assert_eq!(fixed_column("system.title"), None);
        assert_eq!(fixed_column("type.name"), None);
    }

    #[test]
    fn test_column_quoting() {
        assert_eq!(column("work_items", "id"), r#""work_items"."id""#);
        assert_eq!(quote_identifier(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn test_literal_quoting() {
        assert_eq!(quote_literal("system.state"), "'system.state'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal(r"trailing\"), r"E'trailing\\'");
        assert_eq!(quote_literal(r"a\'b"), r"E'a\\''b'");
    }

    #[tokio::test]
    async fn test_static_catalog() {
        let catalog = StaticColumnCatalog::new().with_table("iterations", ["name", "id"]);
        assert!(catalog.has_column("iterations", "name").await.unwrap());
        assert!(!catalog.has_column("iterations", "nme").await.unwrap());
        assert!(!catalog.has_column("areas", "name").await.unwrap());
    }

    #[tokio::test]
    async fn test_information_schema_catalog_sees_dropped_columns() {
        let present = BTreeMap::from([("column_count", Value::BigInt(Some(1)))]);
        let dropped = BTreeMap::from([("column_count", Value::BigInt(Some(0)))]);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![present], vec![dropped]])
                .into_connection(),
        );
        let catalog = InformationSchemaCatalog::new(Arc::clone(&db));

        assert!(catalog.has_column("iterations", "name").await.unwrap());
        assert!(!catalog.has_column("iterations", "name").await.unwrap());

        drop(catalog);
        let Ok(db) = Arc::try_unwrap(db) else {
            panic!("catalog still holds the connection");
        };
        assert_eq!(db.into_transaction_log().len(), 2);
    }
}
