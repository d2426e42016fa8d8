//! Node type schema.
//!
//! The query engine only accepts fields it knows about. A field is known when
//! it is **declared** on the type (by the built-in schema or a plugin's
//! `customize_schema` hook) or, for inferring types, when at least one node of
//! that type actually carries it.
//!
//! Declaring fields matters for optional content: if no blog post has an
//! `external_link` yet, inference alone would not know the field and every
//! query filtering on it would fail. Plugins declare the fields they query so
//! that an empty or sparse content set still builds.
//!
//! Field paths are dotted, exactly as used by [`ContentNode::get_path`]:
//! `frontmatter.date`, `fields.slug`, `link`.

use crate::dates;
use crate::graph::{
    ContentNode, FILE_TYPE, INLINE_SVG_TYPE, MARKDOWN_FIELD_TYPE, MARKDOWN_TYPE, NodeGraph,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Date,
    Int,
    Float,
    Boolean,
    /// Arrays, nulls and anything else without a sort order of its own.
    Json,
}

impl FieldType {
    /// Infer the type of a leaf value.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::String(s) if dates::parse_date(s).is_some() => FieldType::Date,
            Value::String(_) => FieldType::String,
            Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Int,
            Value::Number(_) => FieldType::Float,
            Value::Bool(_) => FieldType::Boolean,
            _ => FieldType::Json,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "String",
            FieldType::Date => "Date",
            FieldType::Int => "Int",
            FieldType::Float => "Float",
            FieldType::Boolean => "Boolean",
            FieldType::Json => "JSON",
        };
        f.write_str(name)
    }
}

/// One node type: declared fields plus whether to infer the rest.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub fields: BTreeMap<String, FieldType>,
    pub infer: bool,
}

impl TypeDef {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: BTreeMap::new(),
            infer: true,
        }
    }

    /// Declare a field. Later declarations of the same path win.
    pub fn field(&mut self, path: &str, field_type: FieldType) -> &mut Self {
        self.fields.insert(path.to_string(), field_type);
        self
    }

    /// Only declared fields are queryable.
    pub fn no_infer(&mut self) -> &mut Self {
        self.infer = false;
        self
    }
}

/// The set of known node types.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<String, TypeDef>,
}

impl Schema {
    /// An empty schema: every type must be declared or present in the graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in types every build knows about.
    pub fn with_builtin_types() -> Self {
        let mut schema = Self::new();
        schema
            .define(FILE_TYPE)
            .field("relativePath", FieldType::String)
            .field("relativeDirectory", FieldType::String)
            .field("name", FieldType::String)
            .field("extension", FieldType::String)
            .field("size", FieldType::Int)
            .no_infer();
        schema
            .define(MARKDOWN_TYPE)
            .field("rawMarkdownBody", FieldType::String)
            .field("fields.slug", FieldType::String)
            .field("fields.html", FieldType::String);
        schema
            .define(MARKDOWN_FIELD_TYPE)
            .field("markdown", FieldType::String)
            .field("fieldPath", FieldType::String)
            .field("key", FieldType::String)
            .field("fields.html", FieldType::String)
            .no_infer();
        schema
            .define(INLINE_SVG_TYPE)
            .field("svg", FieldType::String)
            .no_infer();
        schema
    }

    /// Get or create a type definition.
    pub fn define(&mut self, name: &str) -> &mut TypeDef {
        self.types
            .entry(name.to_string())
            .or_insert_with(|| TypeDef::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    /// Whether `name` is a declared type or has nodes in `graph`.
    pub fn knows_type(&self, graph: &NodeGraph, name: &str) -> bool {
        self.types.contains_key(name) || graph.nodes_of_type(name).next().is_some()
    }

    /// All queryable fields of a type: declared fields plus, when the type
    /// infers, every leaf path found on its nodes. Declarations win over
    /// inferred types.
    pub fn resolve_fields(&self, graph: &NodeGraph, name: &str) -> BTreeMap<String, FieldType> {
        let def = self.types.get(name);
        let mut fields = BTreeMap::new();
        if def.is_none_or(|d| d.infer) {
            for node in graph.nodes_of_type(name) {
                infer_node_fields(node, &mut fields);
            }
        }
        if let Some(def) = def {
            fields.extend(def.fields.iter().map(|(k, v)| (k.clone(), *v)));
        }
        fields
    }

    /// Type names known to either the schema or the graph, sorted.
    pub fn all_type_names(&self, graph: &NodeGraph) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        for name in graph.type_counts().keys() {
            if !self.types.contains_key(*name) {
                names.push(name.to_string());
            }
        }
        names.sort();
        names
    }
}

fn infer_node_fields(node: &ContentNode, out: &mut BTreeMap<String, FieldType>) {
    infer_map(&node.payload, "", out);
    infer_map(&node.fields, "fields", out);
}

fn infer_map(map: &Map<String, Value>, prefix: &str, out: &mut BTreeMap<String, FieldType>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => infer_map(inner, &path, out),
            // A null says nothing about the field's type; keep what we have.
            Value::Null => {
                out.entry(path).or_insert(FieldType::Json);
            }
            leaf => {
                let inferred = FieldType::infer(leaf);
                out.entry(path)
                    .and_modify(|existing| *existing = merge_inferred(*existing, inferred))
                    .or_insert(inferred);
            }
        }
    }
}

/// Two nodes disagreeing on a field's type widen it.
fn merge_inferred(a: FieldType, b: FieldType) -> FieldType {
    match (a, b) {
        (x, y) if x == y => x,
        (FieldType::Json, other) | (other, FieldType::Json) => other,
        (FieldType::Int, FieldType::Float) | (FieldType::Float, FieldType::Int) => FieldType::Float,
        (FieldType::Date, FieldType::String) | (FieldType::String, FieldType::Date) => {
            FieldType::String
        }
        _ => FieldType::Json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use serde_json::json;

    fn graph_of(nodes: &[(&str, &str, Value)]) -> NodeGraph {
        let mut graph = NodeGraph::new();
        for (id, node_type, payload) in nodes {
            graph
                .create_node(ContentNode::new(
                    NodeId::new(*id),
                    *node_type,
                    payload.as_object().cloned().unwrap_or_default(),
                    String::new(),
                ))
                .unwrap();
        }
        graph
    }

    #[test]
    fn infers_leaf_types() {
        assert_eq!(FieldType::infer(&json!("2024-01-01")), FieldType::Date);
        assert_eq!(FieldType::infer(&json!("hello")), FieldType::String);
        assert_eq!(FieldType::infer(&json!(3)), FieldType::Int);
        assert_eq!(FieldType::infer(&json!(3.5)), FieldType::Float);
        assert_eq!(FieldType::infer(&json!(true)), FieldType::Boolean);
        assert_eq!(FieldType::infer(&json!([1, 2])), FieldType::Json);
    }

    #[test]
    fn resolve_fields_infers_nested_paths() {
        let graph = graph_of(&[(
            "a",
            "Markdown",
            json!({"frontmatter": {"title": "Hi", "date": "2024-01-01"}}),
        )]);
        let schema = Schema::new();
        let fields = schema.resolve_fields(&graph, "Markdown");
        assert_eq!(fields.get("frontmatter.title"), Some(&FieldType::String));
        assert_eq!(fields.get("frontmatter.date"), Some(&FieldType::Date));
    }

    #[test]
    fn declared_fields_exist_without_nodes() {
        let mut schema = Schema::new();
        schema
            .define("Markdown")
            .field("frontmatter.external_link", FieldType::String);
        let graph = NodeGraph::new();

        assert!(schema.knows_type(&graph, "Markdown"));
        let fields = schema.resolve_fields(&graph, "Markdown");
        assert_eq!(
            fields.get("frontmatter.external_link"),
            Some(&FieldType::String)
        );
    }

    #[test]
    fn declarations_override_inference() {
        let graph = graph_of(&[("a", "Event", json!({"starts": "2024-01-01"}))]);
        let mut schema = Schema::new();
        schema.define("Event").field("starts", FieldType::String);
        assert_eq!(
            schema.resolve_fields(&graph, "Event").get("starts"),
            Some(&FieldType::String)
        );
    }

    #[test]
    fn no_infer_hides_undeclared_fields() {
        let graph = graph_of(&[("a", FILE_TYPE, json!({"name": "x", "secret": 1}))]);
        let schema = Schema::with_builtin_types();
        let fields = schema.resolve_fields(&graph, FILE_TYPE);
        assert!(fields.contains_key("name"));
        assert!(!fields.contains_key("secret"));
    }

    #[test]
    fn unknown_type_without_nodes() {
        let schema = Schema::with_builtin_types();
        assert!(!schema.knows_type(&NodeGraph::new(), "PagesJson"));
    }

    #[test]
    fn conflicting_inferred_types_widen() {
        let graph = graph_of(&[
            ("a", "T", json!({"n": 1, "d": "2024-01-01"})),
            ("b", "T", json!({"n": 1.5, "d": "soon"})),
        ]);
        let fields = Schema::new().resolve_fields(&graph, "T");
        assert_eq!(fields.get("n"), Some(&FieldType::Float));
        assert_eq!(fields.get("d"), Some(&FieldType::String));
    }

    #[test]
    fn all_type_names_merges_schema_and_graph() {
        let graph = graph_of(&[("a", "PagesJson", json!({}))]);
        let names = Schema::with_builtin_types().all_type_names(&graph);
        assert!(names.contains(&"PagesJson".to_string()));
        assert!(names.contains(&FILE_TYPE.to_string()));
    }
}
