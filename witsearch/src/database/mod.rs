// Schema description and statement assembly for PostgreSQL

pub mod schema;

use sea_orm::{DatabaseBackend, Statement, Value};

/// Number `?` placeholders as `$1`, `$2`, ... outside quoted literals and
/// identifiers.
#[must_use]
pub fn number_placeholders(sql: &str) -> String {
    let mut numbered = String::with_capacity(sql.len() + 8);
    let mut next = 1;
    let mut in_literal = false;
    let mut in_identifier = false;

    for c in sql.chars() {
        match c {
            '\'' if !in_identifier => in_literal = !in_literal,
            '"' if !in_literal => in_identifier = !in_identifier,
            '?' if !in_literal && !in_identifier => {
                numbered.push_str(&format!("${next}"));
                next += 1;
                continue;
            }
            _ => {}
        }
        numbered.push(c);
    }
    numbered
}

/// `PostgreSQL` statement from `?`-placeholder SQL and its values in order
#[must_use]
pub fn postgres_statement(sql: &str, values: Vec<Value>) -> Statement {
    Statement::from_sql_and_values(DatabaseBackend::Postgres, number_placeholders(sql), values)
}
