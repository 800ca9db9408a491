//! Expression compilation into a parameterized `PostgreSQL` predicate.
//!
//! Field references resolve in this order:
//!
//! 1. a physical `work_items` column (`id`, `type`, `version`, `number`, `space`)
//! 2. a joined column whose prefix triggers one of the [`JoinRegistry`] joins
//! 3. a key of the `fields` JSON document
//!
//! Literals are never written into the predicate text. Each one becomes a `?`
//! placeholder and its value is appended to the parameter list in the order
//! the placeholders appear.

use sea_orm::Value;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::expression::Expression;
use super::joined::{JoinRegistry, TableJoin};
use crate::database::schema::{
    ColumnKind, FIELDS_COLUMN, WORK_ITEMS_TABLE, column, fixed_column, quote_literal,
};

/// A problem found while compiling an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    DoubleQuote { field: String },
    SingleQuote { field: String },
    UnhandledJoinField { field: String, table: String },
    EmptyJoinColumn { field: String },
    ColumnNotAllowed { column: String, table: String },
    /// The literal cannot be bound to the column's type
    LiteralTypeMismatch {
        field: String,
        value: String,
        expected: ColumnKind,
    },
    /// Document fields compare by containment, which needs a literal
    ContainmentRequiresLiteral { field: String },
    SubstringRequiresDocumentField { field: String },
    SubstringRequiresField,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoubleQuote { field } => {
                write!(f, "field name must not contain double quotes: {field}")
            }
            Self::SingleQuote { field } => {
                write!(f, "field name must not contain single quotes: {field}")
            }
            Self::UnhandledJoinField { field, table } => {
                write!(f, "field {field} cannot be resolved through table {table}")
            }
            Self::EmptyJoinColumn { field } => {
                write!(f, "field {field} does not name a column after its prefix")
            }
            Self::ColumnNotAllowed { column, table } => {
                write!(f, "column {column} of table {table} cannot be used in a filter")
            }
            Self::LiteralTypeMismatch {
                field,
                value,
                expected,
            } => {
                let expected = match expected {
                    ColumnKind::Uuid => "UUID",
                    ColumnKind::Integer => "integer",
                    ColumnKind::Text => "string",
                };
                write!(f, "value {value} of field {field} is not a valid {expected}")
            }
            Self::ContainmentRequiresLiteral { field } => {
                write!(f, "field {field} can only be compared with a literal value")
            }
            Self::SubstringRequiresDocumentField { field } => {
                write!(f, "substring matching is not supported on field {field}")
            }
            Self::SubstringRequiresField => {
                write!(f, "substring matching requires a field on its left side")
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Output of a successful compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    /// Predicate text with `?` placeholders
    pub where_clause: String,
    pub parameters: Vec<Value>,
    /// Joins referenced by the predicate, keyed by join name
    pub joins: BTreeMap<String, TableJoin>,
}

impl CompiledPredicate {
    /// `LEFT JOIN` clauses for every active join, space separated
    #[must_use]
    pub fn join_clause(&self) -> String {
        self.joins
            .values()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Compile an expression against the `work_items` table.
///
/// Every error in the tree is collected; when any is found no predicate is
/// returned.
///
/// # Errors
///
/// Returns all [`CompileError`]s found in the expression.
pub fn compile(expression: &Expression) -> Result<CompiledPredicate, Vec<CompileError>> {
    let mut compiler = ExpressionCompiler::new();
    let where_clause = compiler.compile(expression);

    if !compiler.errors.is_empty() {
        return Err(compiler.errors);
    }
    Ok(CompiledPredicate {
        where_clause,
        parameters: compiler.parameters,
        joins: compiler.joins.into_active(),
    })
}

/// Where a field reference lives.
enum ResolvedField {
    Column { sql: String, kind: ColumnKind },
    Joined { sql: String },
    Document { key: String },
}

struct ExpressionCompiler {
    joins: JoinRegistry,
    parameters: Vec<Value>,
    errors: Vec<CompileError>,
}

impl ExpressionCompiler {
    fn new() -> Self {
        Self {
            joins: JoinRegistry::work_items(),
            parameters: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn compile(&mut self, expression: &Expression) -> String {
        match expression {
            Expression::Field(_) => self.compile_operand(expression),
            Expression::Literal(value) => self.bind(value),
            Expression::Equals(left, right) => self.compile_comparison(left, right, false),
            Expression::Not(left, right) => self.compile_comparison(left, right, true),
            Expression::And(left, right) => {
                let left = self.compile(left);
                let right = self.compile(right);
                format!("({left} AND {right})")
            }
            Expression::Or(left, right) => {
                let left = self.compile(left);
                let right = self.compile(right);
                format!("({left} OR {right})")
            }
            Expression::IsNull(name) => match self.resolve_field(name) {
                Some(field) => format!("({} IS NULL)", Self::field_sql(&field)),
                None => String::new(),
            },
            Expression::Substring(left, right) => self.compile_substring(left, right),
        }
    }

    fn resolve_field(&mut self, name: &str) -> Option<ResolvedField> {
        if name.contains('"') {
            self.errors.push(CompileError::DoubleQuote {
                field: name.to_string(),
            });
            return None;
        }
        if name.contains('\'') {
            self.errors.push(CompileError::SingleQuote {
                field: name.to_string(),
            });
            return None;
        }

        if let Some(fixed) = fixed_column(name) {
            return Some(ResolvedField::Column {
                sql: column(WORK_ITEMS_TABLE, fixed.name),
                kind: fixed.kind,
            });
        }

        if let Some(join) = self.joins.handler_for(name) {
            return match join.translate_field_name(name) {
                Ok(sql) => Some(ResolvedField::Joined { sql }),
                Err(err) => {
                    self.errors.push(err);
                    None
                }
            };
        }

        Some(ResolvedField::Document {
            key: name.to_string(),
        })
    }

    /// Scalar SQL for a resolved field; document keys are extracted as text
    fn field_sql(field: &ResolvedField) -> String {
        match field {
            ResolvedField::Column { sql, .. } | ResolvedField::Joined { sql } => sql.clone(),
            ResolvedField::Document { key } => {
                format!(
                    "{}->>{}",
                    column(WORK_ITEMS_TABLE, FIELDS_COLUMN),
                    quote_literal(key)
                )
            }
        }
    }

    fn compile_comparison(&mut self, left: &Expression, right: &Expression, negate: bool) -> String {
        let operator = if negate { "!=" } else { "=" };

        let Expression::Field(name) = left else {
            let left = self.compile(left);
            let right = self.compile_operand(right);
            return format!("({left} {operator} {right})");
        };

        match self.resolve_field(name) {
            None => String::new(),
            Some(ResolvedField::Document { key }) => {
                let Expression::Literal(value) = right else {
                    self.errors.push(CompileError::ContainmentRequiresLiteral {
                        field: name.clone(),
                    });
                    return String::new();
                };
                let placeholder = self.bind(value);
                let containment = format!(
                    "{} @> jsonb_build_object({}, {placeholder})",
                    column(WORK_ITEMS_TABLE, FIELDS_COLUMN),
                    quote_literal(&key)
                );
                if negate {
                    format!("NOT ({containment})")
                } else {
                    format!("({containment})")
                }
            }
            Some(ResolvedField::Column { sql, kind }) => {
                let right = match right {
                    Expression::Literal(value) => self.bind_typed(name, value, kind),
                    other => self.compile_operand(other),
                };
                format!("({sql} {operator} {right})")
            }
            Some(ResolvedField::Joined { sql }) => {
                let right = self.compile_operand(right);
                format!("({sql} {operator} {right})")
            }
        }
    }

    /// Compile the right-hand side of a comparison.
    fn compile_operand(&mut self, operand: &Expression) -> String {
        match operand {
            Expression::Literal(value) => self.bind(value),
            Expression::Field(name) => self
                .resolve_field(name)
                .map(|field| Self::field_sql(&field))
                .unwrap_or_default(),
            other => self.compile(other),
        }
    }

    fn compile_substring(&mut self, left: &Expression, right: &Expression) -> String {
        let Expression::Field(name) = left else {
            self.errors.push(CompileError::SubstringRequiresField);
            return String::new();
        };

        match self.resolve_field(name) {
            None => String::new(),
            Some(field @ ResolvedField::Document { .. }) => {
                let pattern = self.compile_operand(right);
                format!("{} ILIKE {pattern}", Self::field_sql(&field))
            }
            Some(_) => {
                self.errors.push(CompileError::SubstringRequiresDocumentField {
                    field: name.clone(),
                });
                String::new()
            }
        }
    }

    fn bind(&mut self, value: &JsonValue) -> String {
        self.parameters.push(literal_parameter(value));
        "?".to_string()
    }

    /// Bind a literal compared against a physical column of type `kind`
    fn bind_typed(&mut self, field: &str, value: &JsonValue, kind: ColumnKind) -> String {
        let Some(parameter) = typed_parameter(value, kind) else {
            self.errors.push(CompileError::LiteralTypeMismatch {
                field: field.to_string(),
                value: value.to_string(),
                expected: kind,
            });
            return String::new();
        };
        self.parameters.push(parameter);
        "?".to_string()
    }
}

/// Bind value for a literal compared against a typed column, if it has one
fn typed_parameter(value: &JsonValue, kind: ColumnKind) -> Option<Value> {
    match (kind, value) {
        (ColumnKind::Uuid, JsonValue::String(text)) => {
            Uuid::parse_str(text.trim()).ok().map(Value::from)
        }
        (ColumnKind::Integer, JsonValue::String(text)) => {
            text.trim().parse::<i64>().ok().map(Value::from)
        }
        (ColumnKind::Integer, JsonValue::Number(number)) => number.as_i64().map(Value::from),
        (ColumnKind::Text, _) => Some(literal_parameter(value)),
        _ => None,
    }
}

/// Convert a JSON literal into a bind value.
fn literal_parameter(value: &JsonValue) -> Value {
    match value {
        JsonValue::String(text) => Value::from(text.clone()),
        JsonValue::Bool(flag) => Value::from(*flag),
        JsonValue::Number(number) => number
            .as_i64()
            .map(Value::from)
            .or_else(|| number.as_f64().map(Value::from))
            .unwrap_or_else(|| Value::from(number.to_string())),
        other => Value::Json(Some(Box::new(other.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str) -> Expression {
        Expression::field(name)
    }

    fn lit(value: impl Into<JsonValue>) -> Expression {
        Expression::literal(value)
    }

    fn expect(expression: &Expression, where_clause: &str, parameters: Vec<Value>) -> CompiledPredicate {
        let compiled = compile(expression).unwrap_or_else(|errors| panic!("{errors:?}"));
        assert_eq!(compiled.where_clause, where_clause);
        assert_eq!(compiled.parameters, parameters);
        compiled
    }

    #[test]
    fn test_literals_compare_as_placeholders() {
        expect(
            &Expression::or(lit(true), lit(false)),
            "(? OR ?)",
            vec![Value::from(true), Value::from(false)],
        );
        expect(
            &Expression::and(
                Expression::not_equals(field("system.title"), lit("abcd")),
                Expression::not_equals(lit(true), lit(false)),
            ),
            r#"(NOT ("work_items"."fields" @> jsonb_build_object('system.title', ?)) AND (? != ?))"#,
            vec![Value::from("abcd"), Value::from(true), Value::from(false)],
        );
    }

    #[test]
    fn test_document_field_equality_is_containment() {
        expect(
            &Expression::equals(field("foo.bar"), lit(23)),
            r#"("work_items"."fields" @> jsonb_build_object('foo.bar', ?))"#,
            vec![Value::from(23i64)],
        );
        expect(
            &Expression::equals(field("system.assignees"), lit(json!(["1", "2", "3"]))),
            r#"("work_items"."fields" @> jsonb_build_object('system.assignees', ?))"#,
            vec![Value::Json(Some(Box::new(json!(["1", "2", "3"]))))],
        );
    }

    #[test]
    fn test_and_of_space_and_status() {
        let expression = Expression::and(
            Expression::equals(field("space"), lit("openshiftio")),
            Expression::equals(field("status"), lit("NEW")),
        );
        let compiled = expect(
            &expression,
            r#"(("work_items"."fields" @> jsonb_build_object('space', ?)) AND ("work_items"."fields" @> jsonb_build_object('status', ?)))"#,
            vec![Value::from("openshiftio"), Value::from("NEW")],
        );
        assert!(compiled.joins.is_empty());
    }

    #[test]
    fn test_negated_fields_never_compare_equal() {
        expect(
            &Expression::not_equals(field("space"), lit("rhel")),
            r#"NOT ("work_items"."fields" @> jsonb_build_object('space', ?))"#,
            vec![Value::from("rhel")],
        );
        let id = Uuid::new_v4();
        expect(
            &Expression::not_equals(field("SpaceID"), lit(id.to_string())),
            r#"("work_items"."space_id" != ?)"#,
            vec![Value::from(id)],
        );
    }

    #[test]
    fn test_uuid_and_integer_columns_bind_typed_values() {
        let id = Uuid::new_v4();
        expect(
            &Expression::equals(field("SpaceID"), lit(id.to_string())),
            r#"("work_items"."space_id" = ?)"#,
            vec![Value::from(id)],
        );
        expect(
            &Expression::equals(field("number"), lit("42")),
            r#"("work_items"."number" = ?)"#,
            vec![Value::from(42i64)],
        );
        expect(
            &Expression::equals(field("version"), lit(3)),
            r#"("work_items"."version" = ?)"#,
            vec![Value::from(3i64)],
        );
    }

    #[test]
    fn test_mistyped_literals_are_rejected() {
        let errors = compile(&Expression::equals(field("number"), lit("abc"))).unwrap_err();
        assert_eq!(
            errors,
            vec![CompileError::LiteralTypeMismatch {
                field: "number".to_string(),
                value: r#""abc""#.to_string(),
                expected: ColumnKind::Integer,
            }]
        );
        assert_eq!(
            errors[0].to_string(),
            r#"value "abc" of field number is not a valid integer"#
        );

        let errors = compile(&Expression::and(
            Expression::equals(field("Type"), lit("bug")),
            Expression::not_equals(field("SpaceID"), lit(true)),
        ))
        .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            errors[0],
            CompileError::LiteralTypeMismatch { expected: ColumnKind::Uuid, .. }
        ));
        assert!(matches!(
            errors[1],
            CompileError::LiteralTypeMismatch { expected: ColumnKind::Uuid, .. }
        ));

        assert!(compile(&Expression::equals(field("version"), lit(1.5))).is_err());
    }

    #[test]
    fn test_parameters_follow_source_order() {
        let expression = Expression::or(
            Expression::and(
                Expression::equals(field("a"), lit("1")),
                Expression::not_equals(field("number"), lit(2)),
            ),
            Expression::and(
                Expression::equals(field("iteration.name"), lit("3")),
                Expression::substring(field("system.title"), lit("%4%")),
            ),
        );
        let compiled = compile(&expression).unwrap();
        assert_eq!(
            compiled.parameters,
            vec![Value::from("1"), Value::from(2i64), Value::from("3"), Value::from("%4%")]
        );
        assert_eq!(compiled.where_clause.matches('?').count(), 4);
    }

    #[test]
    fn test_is_null() {
        expect(
            &Expression::is_null("system.assignees"),
            r#"("work_items"."fields"->>'system.assignees' IS NULL)"#,
            vec![],
        );
        expect(&Expression::is_null("ID"), r#"("work_items"."id" IS NULL)"#, vec![]);
        expect(&Expression::is_null("iteration.name"), r#"("iter"."name" IS NULL)"#, vec![]);
    }

    #[test]
    fn test_substring_on_document_field() {
        expect(
            &Expression::substring(field("system.title"), lit("%title%")),
            r#""work_items"."fields"->>'system.title' ILIKE ?"#,
            vec![Value::from("%title%")],
        );
        // text after the key stays inside the quoted key
        expect(
            &Expression::substring(field("system.title;DELETE FROM work_items"), lit("%x%")),
            r#""work_items"."fields"->>'system.title;DELETE FROM work_items' ILIKE ?"#,
            vec![Value::from("%x%")],
        );
        // a trailing backslash cannot end the key literal early
        expect(
            &Expression::equals(field(r"system.title\"), lit("x")),
            r#"("work_items"."fields" @> jsonb_build_object(E'system.title\\', ?))"#,
            vec![Value::from("x")],
        );
        expect(
            &Expression::is_null(r"a\b"),
            r#"("work_items"."fields"->>E'a\\b' IS NULL)"#,
            vec![],
        );
    }

    #[test]
    fn test_substring_rejects_columns_and_joins() {
        let errors = compile(&Expression::substring(field("number"), lit("%1%"))).unwrap_err();
        assert_eq!(
            errors,
            vec![CompileError::SubstringRequiresDocumentField {
                field: "number".to_string()
            }]
        );
        assert!(compile(&Expression::substring(field("iteration.name"), lit("%a%"))).is_err());
        assert!(compile(&Expression::substring(lit("a"), lit("%a%"))).is_err());
    }

    #[test]
    fn test_quotes_in_field_names_fail() {
        let errors =
            compile(&Expression::substring(field("system.title'"), lit("%x%"))).unwrap_err();
        assert_eq!(
            errors,
            vec![CompileError::SingleQuote {
                field: "system.title'".to_string()
            }]
        );
        assert_eq!(
            errors[0].to_string(),
            "field name must not contain single quotes: system.title'"
        );

        let errors = compile(&Expression::equals(field("foo\"bar"), lit("x"))).unwrap_err();
        assert_eq!(
            errors[0].to_string(),
            "field name must not contain double quotes: foo\"bar"
        );
    }

    #[test]
    fn test_errors_are_collected_across_branches() {
        let expression = Expression::and(
            Expression::equals(field("a'b"), lit("1")),
            Expression::or(
                Expression::equals(field("space"), lit("x")),
                Expression::is_null("c\"d"),
            ),
        );
        let errors = compile(&expression).unwrap_err();
        assert_eq!(
            errors,
            vec![
                CompileError::SingleQuote { field: "a'b".to_string() },
                CompileError::DoubleQuote { field: "c\"d".to_string() },
            ]
        );
    }

    #[test]
    fn test_joined_field_activates_one_join() {
        let compiled = expect(
            &Expression::equals(field("iteration.name"), lit("sprint 1")),
            r#"("iter"."name" = ?)"#,
            vec![Value::from("sprint 1")],
        );
        assert_eq!(compiled.joins.len(), 1);
        let join = &compiled.joins["iteration"];
        assert_eq!(join.table_alias(), "iter");
        assert_eq!(join.handled_fields(), ["name".to_string()]);
        assert_eq!(
            compiled.join_clause(),
            r#"LEFT JOIN iterations iter ON "work_items"."fields" @> concat('{"system.iteration": "', "iter"."id", '"}')::jsonb"#
        );
    }

    #[test]
    fn test_join_prefixes() {
        let cases = [
            ("area.name", "area", r#""ar"."name""#),
            ("codebase.url", "codebase", r#""cb"."url""#),
            ("wit.name", "work_item_type", r#""wit"."name""#),
            ("work_item_type.name", "work_item_type", r#""wit"."name""#),
            ("type.name", "work_item_type", r#""wit"."name""#),
            ("space.name", "space", r#""space"."name""#),
            ("creator.full_name", "creator", r#""creator"."full_name""#),
            ("author.full_name", "creator", r#""creator"."full_name""#),
        ];
        for (name, join, column_sql) in cases {
            let compiled = compile(&Expression::equals(field(name), lit("x"))).unwrap();
            assert_eq!(compiled.where_clause, format!("({column_sql} = ?)"), "{name}");
            assert_eq!(compiled.joins.keys().collect::<Vec<_>>(), [join], "{name}");
        }
    }

    #[test]
    fn test_multiple_joins_are_ordered_by_name() {
        let compiled = compile(&Expression::and(
            Expression::equals(field("iteration.name"), lit("a")),
            Expression::equals(field("area.name"), lit("b")),
        ))
        .unwrap();
        assert_eq!(compiled.joins.keys().collect::<Vec<_>>(), ["area", "iteration"]);
        assert!(compiled.join_clause().starts_with("LEFT JOIN areas ar ON"));
    }

    #[test]
    fn test_disallowed_join_column() {
        let errors = compile(&Expression::equals(field("creator.email"), lit("x"))).unwrap_err();
        assert_eq!(
            errors,
            vec![CompileError::ColumnNotAllowed {
                column: "email".to_string(),
                table: "identities".to_string()
            }]
        );
    }

    #[test]
    fn test_document_comparison_against_field_fails() {
        let errors = compile(&Expression::equals(field("system.title"), field("system.state")))
            .unwrap_err();
        assert!(matches!(errors[0], CompileError::ContainmentRequiresLiteral { .. }));
    }

    #[test]
    fn test_compilation_is_idempotent() {
        let expression = Expression::and(
            Expression::equals(field("iteration.name"), lit("a")),
            Expression::not_equals(field("system.state"), lit("closed")),
        );
        assert_eq!(compile(&expression).unwrap(), compile(&expression).unwrap());
    }
}
