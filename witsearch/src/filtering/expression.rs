//! Boolean expression tree that filters lower into and the compiler walks.

use serde_json::Value as JsonValue;
use std::fmt;

/// An immutable filter expression.
///
/// `Field` and `Literal` are the leaves; every other variant combines
/// sub-expressions. `Not` is the inequality comparison, not a unary negation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Reference to a column, a joined column or a key in the `fields` document
    Field(String),
    Literal(JsonValue),
    Equals(Box<Expression>, Box<Expression>),
    Not(Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    IsNull(String),
    /// Case-insensitive pattern match; wildcards come with the literal
    Substring(Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn literal(value: impl Into<JsonValue>) -> Self {
        Self::Literal(value.into())
    }

    #[must_use]
    pub fn equals(left: Self, right: Self) -> Self {
        Self::Equals(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn not_equals(left: Self, right: Self) -> Self {
        Self::Not(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    pub fn is_null(name: impl Into<String>) -> Self {
        Self::IsNull(name.into())
    }

    #[must_use]
    pub fn substring(left: Self, right: Self) -> Self {
        Self::Substring(Box::new(left), Box::new(right))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{name}"),
            Self::Literal(value) => write!(f, "{value}"),
            Self::Equals(l, r) => write!(f, "{l} == {r}"),
            Self::Not(l, r) => write!(f, "{l} != {r}"),
            Self::And(l, r) => write!(f, "({l} and {r})"),
            Self::Or(l, r) => write!(f, "({l} or {r})"),
            Self::IsNull(name) => write!(f, "{name} is null"),
            Self::Substring(l, r) => write!(f, "{l} contains {r}"),
        }
    }
}
