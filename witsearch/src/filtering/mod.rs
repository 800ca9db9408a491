//! # Filtering & Full-Text Search
//!
//! Turns client search input into parameterized `PostgreSQL`.
//!
//! ## Main Components
//!
//! - **[`query_parser`]**: JSON filter parsing into [`Query`] trees and [`Expression`]s
//! - **[`compiler`]**: expression compilation into a predicate, parameters and joins
//! - **[`joined`]**: the relations a filter may reach with dotted field names
//! - **[`search`]**: free-text tokenization into a `to_tsquery` string
//! - **[`known_urls`]**: URL shapes recognised in free text
//! - **[`pagination`]**: `start`/`limit` validation and `Content-Range` headers
//!
//! ## Filter Examples
//!
//! ```rust,ignore
//! // work items of one space in state NEW
//! GET /search?filter={"$AND":[{"SpaceID":"<uuid>"},{"system.state":"new"}]}
//!
//! // anything not in that space
//! GET /search?filter={"SpaceID":"<uuid>","negate":true}
//!
//! // by iteration name, through a join
//! GET /search?filter={"iteration.name":"Sprint 12"}
//! ```
//!
//! ## Free-Text Examples
//!
//! ```rust,ignore
//! GET /search?q=login page
//! GET /search?q=number:1234
//! GET /search?q=type:<uuid> crash
//! GET /search?q=https://demo.example/work-item/list/detail/100
//! ```

pub mod compiler;
pub mod expression;
pub mod joined;
pub mod known_urls;
pub mod pagination;
pub mod query_parser;
pub mod search;

pub use compiler::{CompileError, CompiledPredicate, compile};
pub use expression::Expression;
pub use joined::{JoinRegistry, TableJoin};
pub use known_urls::{KnownUrl, KnownUrlRegistry};
pub use pagination::{Page, calculate_content_range, validate_pagination};
pub use query_parser::{Query, parse_filter_string, parse_query};
pub use search::{SearchKeywords, parse_search_string};
