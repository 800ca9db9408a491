#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, Statement, Transaction, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use witsearch::{KnownUrlRegistry, SeaOrmSearchRepository, SearchConfig, StaticColumnCatalog};

pub type Row = BTreeMap<&'static str, Value>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Configuration recognising work item URLs on `demo.example`
pub fn test_config() -> SearchConfig {
    SearchConfig {
        work_item_url_host: Some("demo.example".to_string()),
        ..SearchConfig::default()
    }
}

/// Schema of the joinable tables as seen by the tests
pub fn test_catalog() -> StaticColumnCatalog {
    StaticColumnCatalog::new()
        .with_table("iterations", ["id", "name", "path", "state"])
        .with_table("areas", ["id", "name", "path"])
        .with_table("identities", ["id", "username", "full_name"])
        .with_table("work_item_types", ["id", "name", "path"])
        .with_table("spaces", ["id", "name"])
}

/// Mocked connection shared between a test and the repository under test
pub fn mock_db(results: Vec<Vec<Row>>) -> Arc<DatabaseConnection> {
    Arc::new(
        MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(results)
            .into_connection(),
    )
}

pub fn repository(db: &Arc<DatabaseConnection>, config: SearchConfig) -> SeaOrmSearchRepository {
    let known_urls =
        Arc::new(KnownUrlRegistry::from_config(&config).expect("known URL patterns compile"));
    SeaOrmSearchRepository::new(Arc::clone(db), Arc::new(config), known_urls)
        .with_column_catalog(Arc::new(test_catalog()))
}

/// Statements the mock received, once the repository has let go of it
pub fn transaction_log(
    repository: SeaOrmSearchRepository,
    db: Arc<DatabaseConnection>,
) -> Vec<Transaction> {
    drop(repository);
    let Ok(db) = Arc::try_unwrap(db) else {
        panic!("the connection is still shared");
    };
    db.into_transaction_log()
}

/// A result row carrying the windowed total in its first column
pub fn work_item_row(total: i64, number: i32) -> Row {
    let created = Utc
        .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp");
    BTreeMap::from([
        ("total_count", Value::BigInt(Some(total))),
        ("id", Value::from(Uuid::new_v4())),
        ("number", Value::from(number)),
        ("type_id", Value::from(Uuid::new_v4())),
        ("space_id", Value::from(Uuid::new_v4())),
        ("version", Value::from(1i32)),
        (
            "fields",
            Value::from(serde_json::json!({"system.title": format!("Item {number}"), "system.state": "new"})),
        ),
        ("execution_order", Value::from(f64::from(number) * 1000.0)),
        ("created_at", Value::from(created)),
        ("updated_at", Value::from(created)),
    ])
}

pub fn count_row(total: i64) -> Row {
    BTreeMap::from([("total_count", Value::BigInt(Some(total)))])
}

/// The mock log entry produced by running `statement` outside a transaction
pub fn logged(statement: &Statement) -> Transaction {
    Transaction::from_sql_and_values(
        DatabaseBackend::Postgres,
        statement.sql.as_str(),
        statement.values.clone().map(|values| values.0).unwrap_or_default(),
    )
}
