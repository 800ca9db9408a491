//! JSON filter parsing.
//!
//! A filter is a nested JSON object:
//!
//! ```text
//! expr := {"$AND": [expr, ...]}
//!       | {"$OR":  [expr, ...]}
//!       | {"<field>": "<value>"}            (optionally with "negate": true)
//! ```
//!
//! Parsing happens in two steps. Every object entry is first decoded into an
//! [`Entry`], then the [`Query`] node is assembled from its already-parsed
//! children. [`Query::to_expression`] lowers the tree into an [`Expression`].

use serde_json::{Map, Value as JsonValue};

use super::expression::Expression;
use crate::errors::SearchError;

pub const OPERATOR_AND: &str = "$AND";
pub const OPERATOR_OR: &str = "$OR";
pub const NEGATE_KEY: &str = "negate";

const FILTER_PARAMETER: &str = "filter";

/// Raw parse tree of a filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Operator keyword for operator nodes, field name for leaves
    pub name: String,
    /// `None` for operator nodes; an empty string is a real value
    pub value: Option<String>,
    pub negate: bool,
    pub children: Vec<Query>,
}

/// A single decoded `key: value` pair of a filter object.
enum Entry<'a> {
    Operator(&'a str, &'a [JsonValue]),
    Leaf(&'a str, &'a str),
    NegateFlag(bool),
}

fn is_operator(name: &str) -> bool {
    name == OPERATOR_AND || name == OPERATOR_OR
}

fn decode_entry<'a>(key: &'a str, value: &'a JsonValue) -> Result<Entry<'a>, SearchError> {
    match value {
        JsonValue::Array(items) if is_operator(key) => Ok(Entry::Operator(key, items)),
        JsonValue::Array(_) => Err(SearchError::bad_parameter_because(
            FILTER_PARAMETER,
            key,
            format!("unknown operator, expected {OPERATOR_AND} or {OPERATOR_OR}"),
        )),
        JsonValue::String(value) => Ok(Entry::Leaf(key, value)),
        JsonValue::Bool(flag) if key == NEGATE_KEY => Ok(Entry::NegateFlag(*flag)),
        JsonValue::Bool(_) => Err(SearchError::bad_parameter_because(
            FILTER_PARAMETER,
            key,
            format!("only '{NEGATE_KEY}' may carry a boolean"),
        )),
        _ => Err(SearchError::bad_parameter_because(
            FILTER_PARAMETER,
            key,
            "field values must be strings",
        )),
    }
}

impl Query {
    #[must_use]
    pub fn is_operator(&self) -> bool {
        is_operator(&self.name)
    }

    /// Lower this node into an expression.
    ///
    /// Operator nodes fold their children left to right, skipping children
    /// that produce nothing; a single child is returned as is.
    #[must_use]
    pub fn to_expression(&self) -> Option<Expression> {
        if !self.is_operator() {
            let value = self.value.as_ref()?;
            let field = Expression::field(self.name.clone());
            let literal = Expression::literal(value.clone());
            return Some(if self.negate {
                Expression::not_equals(field, literal)
            } else {
                Expression::equals(field, literal)
            });
        }

        let combine = if self.name == OPERATOR_AND {
            Expression::and
        } else {
            Expression::or
        };
        self.children
            .iter()
            .filter_map(Query::to_expression)
            .reduce(combine)
    }
}

fn parse_object(
    object: &Map<String, JsonValue>,
    depth: usize,
    max_depth: usize,
) -> Result<Query, SearchError> {
    if depth > max_depth {
        return Err(SearchError::bad_parameter_because(
            FILTER_PARAMETER,
            format!("depth {depth}"),
            format!("filters may nest at most {max_depth} levels"),
        ));
    }

    let mut node: Option<Query> = None;
    let mut negate = false;

    for (key, value) in object {
        let parsed = match decode_entry(key, value)? {
            Entry::NegateFlag(flag) => {
                negate = flag;
                continue;
            }
            Entry::Operator(name, items) => {
                let children = items
                    .iter()
                    .map(|item| match item {
                        JsonValue::Object(child) => parse_object(child, depth + 1, max_depth),
                        other => Err(SearchError::bad_parameter_because(
                            FILTER_PARAMETER,
                            other.to_string(),
                            format!("{name} expects an array of objects"),
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Query {
                    name: name.to_string(),
                    value: None,
                    negate: false,
                    children,
                }
            }
            Entry::Leaf(name, value) => Query {
                name: name.to_string(),
                value: Some(value.to_string()),
                negate: false,
                children: Vec::new(),
            },
        };

        if let Some(existing) = &node {
            return Err(SearchError::bad_parameter_because(
                FILTER_PARAMETER,
                key,
                format!(
                    "an expression may name only one field or operator, found '{}' as well",
                    existing.name
                ),
            ));
        }
        node = Some(parsed);
    }

    let query = node.ok_or_else(|| {
        SearchError::bad_parameter_because(
            FILTER_PARAMETER,
            JsonValue::Object(object.clone()).to_string(),
            "expression must name a field or an operator",
        )
    })?;

    if negate && query.is_operator() {
        return Err(SearchError::bad_parameter_because(
            FILTER_PARAMETER,
            query.name,
            "operators cannot be negated",
        ));
    }

    Ok(Query { negate, ..query })
}

/// Parse a raw JSON filter into its query tree.
///
/// # Errors
///
/// Returns [`SearchError::BadParameter`] for malformed JSON or any object that
/// does not follow the filter grammar.
pub fn parse_query(raw: &str, max_depth: usize) -> Result<Query, SearchError> {
    let value: JsonValue = serde_json::from_str(raw).map_err(|err| {
        SearchError::bad_parameter_because(FILTER_PARAMETER, raw, err.to_string())
    })?;

    match &value {
        JsonValue::Object(object) => parse_object(object, 1, max_depth),
        _ => Err(SearchError::bad_parameter_because(
            FILTER_PARAMETER,
            raw,
            "filter must be a JSON object",
        )),
    }
}

/// Parse a raw JSON filter straight into an expression.
///
/// # Errors
///
/// Everything [`parse_query`] rejects, plus filters without any condition
/// such as `{"$AND": []}`.
pub fn parse_filter_string(raw: &str, max_depth: usize) -> Result<Expression, SearchError> {
    let query = parse_query(raw, max_depth)?;
    query.to_expression().ok_or_else(|| {
        SearchError::bad_parameter_because(
            FILTER_PARAMETER,
            raw,
            "filter must contain at least one condition",
        )
    })
}
