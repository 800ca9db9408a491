// Repository trait and its Sea-ORM implementation

pub mod repository;
pub mod traits;

pub use repository::{FullTextQuery, SeaOrmSearchRepository, SearchStatements};
pub use traits::{ColumnCatalog, SearchRepository};
