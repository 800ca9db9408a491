//! Joinable relations for filtering on related entity columns.
//!
//! A field such as `iteration.name` routes through the `iteration` join: the
//! prefix is stripped, the column is checked against the join's allow and deny
//! lists, and the join is marked active so its `LEFT JOIN` is emitted. A fresh
//! [`JoinRegistry`] is built for every compilation, so activation never leaks
//! between requests.

use std::collections::BTreeMap;
use std::fmt;

use super::compiler::CompileError;
use crate::core::traits::ColumnCatalog;
use crate::database::schema::{FIELDS_COLUMN, WORK_ITEMS_TABLE, column};
use crate::errors::SearchError;

/// A statically known relation that filters may reach through a `LEFT JOIN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableJoin {
    table_name: String,
    table_alias: String,
    on: String,
    prefix_activators: Vec<String>,
    allowed_columns: Vec<String>,
    disallowed_columns: Vec<String>,
    handled_fields: Vec<String>,
    active: bool,
}

/// Join condition matching a work item whose `fields` document stores the
/// joined row's key under `json_field`.
#[must_use]
pub fn join_on_json_field(json_field: &str, foreign_column: &str) -> String {
    format!(
        "{} @> concat('{{\"{json_field}\": \"', {foreign_column}, '\"}}')::jsonb",
        column(WORK_ITEMS_TABLE, FIELDS_COLUMN)
    )
}

impl TableJoin {
    pub fn new(
        table_name: impl Into<String>,
        table_alias: impl Into<String>,
        on: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            table_alias: table_alias.into(),
            on: on.into(),
            prefix_activators: Vec::new(),
            allowed_columns: Vec::new(),
            disallowed_columns: Vec::new(),
            handled_fields: Vec::new(),
            active: false,
        }
    }

    #[must_use]
    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_activators
            .extend(prefixes.into_iter().map(Into::into));
        self
    }

    /// Restrict the join to these columns; an empty list allows every column
    #[must_use]
    pub fn allow_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    /// Columns that may never be referenced, even if allowed
    #[must_use]
    pub fn disallow_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn table_alias(&self) -> &str {
        &self.table_alias
    }

    pub fn handled_fields(&self) -> &[String] {
        &self.handled_fields
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    fn matching_prefix(&self, field_name: &str) -> Option<&str> {
        self.prefix_activators
            .iter()
            .filter(|prefix| field_name.starts_with(prefix.as_str()))
            .max_by_key(|prefix| prefix.len())
            .map(String::as_str)
    }

    #[must_use]
    pub fn handles_field_name(&self, field_name: &str) -> bool {
        self.matching_prefix(field_name).is_some()
    }

    fn is_column_allowed(&self, col: &str) -> bool {
        if self.disallowed_columns.iter().any(|c| c == col) {
            return false;
        }
        self.allowed_columns.is_empty() || self.allowed_columns.iter().any(|c| c == col)
    }

    /// Turn `prefix.column` into the aliased column reference and activate the join.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] when the field does not belong to this join,
    /// names no column, contains a quote, or names a column the join forbids.
    pub fn translate_field_name(&mut self, field_name: &str) -> Result<String, CompileError> {
        let Some(prefix) = self.matching_prefix(field_name) else {
            return Err(CompileError::UnhandledJoinField {
                field: field_name.to_string(),
                table: self.table_name.clone(),
            });
        };
        let col = field_name[prefix.len()..].trim();

        if col.is_empty() {
            return Err(CompileError::EmptyJoinColumn {
                field: field_name.to_string(),
            });
        }
        if col.contains('\'') {
            return Err(CompileError::SingleQuote {
                field: field_name.to_string(),
            });
        }
        if col.contains('"') {
            return Err(CompileError::DoubleQuote {
                field: field_name.to_string(),
            });
        }
        if !self.is_column_allowed(col) {
            return Err(CompileError::ColumnNotAllowed {
                column: col.to_string(),
                table: self.table_name.clone(),
            });
        }

        let col = col.to_string();
        let translated = column(&self.table_alias, &col);
        self.activate();
        if !self.handled_fields.contains(&col) {
            self.handled_fields.push(col);
        }
        Ok(translated)
    }

    /// Check every column routed through this join against the database schema.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Internal`] naming the first column the joined
    /// table does not have, or the catalog's database error.
    pub async fn is_valid(&self, catalog: &dyn ColumnCatalog) -> Result<(), SearchError> {
        for field in &self.handled_fields {
            if !catalog.has_column(&self.table_name, field).await? {
                return Err(SearchError::internal(
                    "Search could not be executed against the current schema",
                    Some(format!(
                        "table \"{}\" has no column \"{field}\" (join alias \"{}\")",
                        self.table_name, self.table_alias
                    )),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for TableJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LEFT JOIN {} {} ON {}",
            self.table_name, self.table_alias, self.on
        )
    }
}

/// The relations reachable from `work_items`, keyed by join name.
#[derive(Debug, Clone)]
pub struct JoinRegistry {
    joins: BTreeMap<String, TableJoin>,
}

impl JoinRegistry {
    /// Fresh, inactive joins for one compilation
    #[must_use]
    pub fn work_items() -> Self {
        let joins = [
            (
                "area",
                TableJoin::new("areas", "ar", join_on_json_field("system.area", &column("ar", "id")))
                    .with_prefixes(["area."]),
            ),
            (
                "codebase",
                TableJoin::new(
                    "codebases",
                    "cb",
                    join_on_json_field("system.codebase", &column("cb", "id")),
                )
                .with_prefixes(["codebase."]),
            ),
            (
                "creator",
                TableJoin::new(
                    "identities",
                    "creator",
                    join_on_json_field("system.creator", &column("creator", "id")),
                )
                .with_prefixes(["creator.", "author."])
                .allow_columns(["id", "username", "full_name"]),
            ),
            (
                "iteration",
                TableJoin::new(
                    "iterations",
                    "iter",
                    join_on_json_field("system.iteration", &column("iter", "id")),
                )
                .with_prefixes(["iteration."]),
            ),
            (
                "space",
                TableJoin::new(
                    "spaces",
                    "space",
                    format!("{} = {}", column("space", "id"), column(WORK_ITEMS_TABLE, "space_id")),
                )
                .with_prefixes(["space."]),
            ),
            (
                "work_item_type",
                TableJoin::new(
                    "work_item_types",
                    "wit",
                    format!("{} = {}", column("wit", "id"), column(WORK_ITEMS_TABLE, "type")),
                )
                .with_prefixes(["wit.", "work_item_type.", "type."])
                .disallow_columns(["fields"]),
            ),
        ];

        Self {
            joins: joins
                .into_iter()
                .map(|(name, join)| (name.to_string(), join))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&TableJoin> {
        self.joins.get(name)
    }

    /// The join whose prefix trigger matches `field_name`, if any
    pub fn handler_for(&mut self, field_name: &str) -> Option<&mut TableJoin> {
        self.joins
            .values_mut()
            .find(|join| join.handles_field_name(field_name))
    }

    /// Consume the registry keeping only the joins some field routed through
    #[must_use]
    pub fn into_active(self) -> BTreeMap<String, TableJoin> {
        self.joins
            .into_iter()
            .filter(|(_, join)| join.is_active())
            .collect()
    }
}
