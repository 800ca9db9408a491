//! # witsearch
//!
//! Filtering and full-text search for work items stored in `PostgreSQL`.
//!
//! Clients send either a JSON boolean filter or a free-text search string.
//! Filters are parsed into an [`Expression`], compiled into a parameterized
//! predicate with the joins it needs, and executed with pagination. Free text
//! is tokenized into a `to_tsquery` string, recognising `number:` and `type:`
//! tokens and known URL shapes.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use witsearch::{KnownUrlRegistry, SeaOrmSearchRepository, SearchConfig, SearchRepository};
//!
//! let config = Arc::new(SearchConfig::default());
//! let known_urls = Arc::new(KnownUrlRegistry::from_config(&config)?);
//! let repository = SeaOrmSearchRepository::new(Arc::new(db), config, known_urls);
//!
//! let page = repository
//!     .filter(r#"{"$AND":[{"space":"openshiftio"},{"status":"NEW"}]}"#, Some(0), Some(20))
//!     .await?;
//! println!("{} of {}", page.items.len(), page.total_count);
//! ```

pub mod config;
pub mod core;
pub mod database;
pub mod errors;
pub mod filtering;
pub mod models;
pub mod routes;

pub use crate::config::{KnownUrlConfig, SearchConfig};
pub use crate::core::{ColumnCatalog, SeaOrmSearchRepository, SearchRepository};
pub use database::schema::{InformationSchemaCatalog, StaticColumnCatalog};
pub use errors::SearchError;
pub use filtering::{
    CompileError, CompiledPredicate, Expression, KnownUrlRegistry, Query, SearchKeywords,
    TableJoin,
};
pub use models::{SearchPage, SearchParams, WorkItemRecord};
