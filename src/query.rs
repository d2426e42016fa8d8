//! Declarative queries over the node graph.
//!
//! Route generation never walks the graph directly; it describes what it
//! wants as a [`Query`] (node type, filters, sort keys, skip/limit) and hands
//! it to a [`GraphQuery`] implementation. The in-memory [`QueryEngine`] is the
//! production implementation; tests substitute their own to simulate
//! failures.
//!
//! ## Semantics
//!
//! - Unknown node types and unknown fields are errors, not empty results.
//!   See [`crate::schema`] for what makes a field known.
//! - Sorting compares values by their schema type: dates as dates, numbers
//!   numerically, strings lexically. Nodes missing a sort field come last in
//!   both directions.
//! - After all sort keys, ties are broken by node id ascending, so results
//!   are deterministic even when dates collide.

use crate::dates;
use crate::graph::{ContentNode, NodeGraph};
use crate::schema::{FieldType, Schema};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

/// Pseudo-field addressing the node id in filters and sorts.
pub const ID_FIELD: &str = "id";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Unknown node type '{0}'")]
    UnknownType(String),
    #[error("Unknown field '{field}' on type '{node_type}'")]
    UnknownField { node_type: String, field: String },
    #[error("Query failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the given value.
    Eq { field: String, value: Value },
    /// Field is present and not null.
    Exists(String),
    /// Field is absent or null.
    Missing(String),
}

impl Filter {
    fn field(&self) -> &str {
        match self {
            Filter::Eq { field, .. } | Filter::Exists(field) | Filter::Missing(field) => field,
        }
    }

    fn matches(&self, node: &ContentNode) -> bool {
        match self {
            Filter::Eq { field, value } => lookup(node, field).as_ref() == Some(value),
            Filter::Exists(field) => lookup(node, field).is_some_and(|v| !v.is_null()),
            Filter::Missing(field) => lookup(node, field).is_none_or(|v| v.is_null()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub order: Order,
}

/// A filter + sort + window over nodes of one type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub node_type: String,
    pub filters: Vec<Filter>,
    pub sort: Vec<SortKey>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Default::default()
        }
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn exists(mut self, field: impl Into<String>) -> Self {
        self.filters.push(Filter::Exists(field.into()));
        self
    }

    pub fn missing(mut self, field: impl Into<String>) -> Self {
        self.filters.push(Filter::Missing(field.into()));
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            order,
        });
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Anything that can answer a [`Query`].
pub trait GraphQuery: Sync {
    fn run(&self, query: &Query) -> Result<Vec<ContentNode>, QueryError>;
}

/// Runs queries against an in-memory graph, validated by a schema.
pub struct QueryEngine<'a> {
    graph: &'a NodeGraph,
    schema: &'a Schema,
}

impl<'a> QueryEngine<'a> {
    pub fn new(graph: &'a NodeGraph, schema: &'a Schema) -> Self {
        Self { graph, schema }
    }

    fn check_fields(
        &self,
        query: &Query,
        known: &BTreeMap<String, FieldType>,
    ) -> Result<(), QueryError> {
        let referenced = query
            .filters
            .iter()
            .map(Filter::field)
            .chain(query.sort.iter().map(|s| s.field.as_str()));
        for field in referenced {
            if field != ID_FIELD && !is_known_path(known, field) {
                return Err(QueryError::UnknownField {
                    node_type: query.node_type.clone(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl GraphQuery for QueryEngine<'_> {
    fn run(&self, query: &Query) -> Result<Vec<ContentNode>, QueryError> {
        if !self.schema.knows_type(self.graph, &query.node_type) {
            return Err(QueryError::UnknownType(query.node_type.clone()));
        }
        let known = self.schema.resolve_fields(self.graph, &query.node_type);
        self.check_fields(query, &known)?;

        let mut matched: Vec<&ContentNode> = self
            .graph
            .nodes_of_type(&query.node_type)
            .filter(|node| query.filters.iter().all(|f| f.matches(node)))
            .collect();

        matched.sort_by(|a, b| {
            for key in &query.sort {
                let field_type = known.get(&key.field).copied().unwrap_or(FieldType::Json);
                let ordering = compare_field(
                    lookup(a, &key.field).as_ref(),
                    lookup(b, &key.field).as_ref(),
                    field_type,
                    key.order,
                );
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.id.cmp(&b.id)
        });

        let window = matched.into_iter().skip(query.skip);
        let results = match query.limit {
            Some(limit) => window.take(limit).cloned().collect(),
            None => window.cloned().collect(),
        };
        Ok(results)
    }
}

/// A path is known if it is a declared/inferred leaf or a prefix of one.
fn is_known_path(known: &BTreeMap<String, FieldType>, path: &str) -> bool {
    known.contains_key(path)
        || known
            .keys()
            .any(|k| k.len() > path.len() && k.starts_with(path) && k.as_bytes()[path.len()] == b'.')
}

fn lookup(node: &ContentNode, field: &str) -> Option<Value> {
    if field == ID_FIELD {
        return Some(Value::String(node.id.to_string()));
    }
    node.get_path(field).cloned()
}

/// Compare two optional field values; absent (or unparseable) values sort
/// last regardless of `order`.
fn compare_field(a: Option<&Value>, b: Option<&Value>, field_type: FieldType, order: Order) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    let ordering = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(a), Some(b)) => match field_type {
            FieldType::Date => {
                match (dates::parse_date_value(a), dates::parse_date_value(b)) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Greater,
                    (Some(_), None) => return Ordering::Less,
                }
            }
            FieldType::Int | FieldType::Float => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Greater,
                (Some(_), None) => return Ordering::Less,
            },
            FieldType::Boolean => a.as_bool().cmp(&b.as_bool()),
            FieldType::String => a.as_str().cmp(&b.as_str()),
            FieldType::Json => a.to_string().cmp(&b.to_string()),
        },
    };
    match order {
        Order::Asc => ordering,
        Order::Desc => ordering.reverse(),
    }
}
