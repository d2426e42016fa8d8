//! Markdown field extraction.
//!
//! Structured content often embeds markdown in ordinary fields: a page record
//! with an `md_intro`, frontmatter with an `md_summary`. Every string whose
//! key starts with the configured marker (`[markdown] field_marker`) becomes
//! its own `MarkdownField` node, linked under the node it was found in, so
//! the markdown renderer treats it like any other markdown document.
//!
//! The payload is walked depth-first. Nested mappings extend the key path;
//! arrays and scalars that are not marker-keyed strings are ignored. Empty
//! strings are extracted too.
//!
//! ## Key paths
//!
//! The node id is derived from the parent id and the dot-joined key path.
//! Dots and backslashes inside a key are escaped (`a.b` → `a\.b`), so
//! `{"a": {"md_b": ..}}` and `{"a.md_b": ..}` never share an id.

use crate::graph::{Actions, ContentNode, MARKDOWN_FIELD_TYPE, MARKDOWN_TYPE, NodeId};
use crate::pipeline::{NodeContext, Plugin, text_digest};
use serde_json::{Map, Value};

/// Id kind of extracted field nodes.
const ID_KIND: &str = "md";

/// A marker-keyed string found in a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownFieldRef<'a> {
    /// Escaped, dot-joined path from the payload root.
    pub path: String,
    /// The unescaped leaf key.
    pub key: &'a str,
    pub markdown: &'a str,
}

/// Escape a key for use as one segment of a dotted path.
pub fn escape_segment(key: &str) -> String {
    key.replace('\\', "\\\\").replace('.', "\\.")
}

/// Find every marker-keyed string in `payload`, in key order.
pub fn find_markdown_fields<'a>(
    payload: &'a Map<String, Value>,
    marker: &str,
) -> Vec<MarkdownFieldRef<'a>> {
    let mut found = Vec::new();
    walk(payload, marker, &mut Vec::new(), &mut found);
    found
}

fn walk<'a>(
    map: &'a Map<String, Value>,
    marker: &str,
    path: &mut Vec<String>,
    found: &mut Vec<MarkdownFieldRef<'a>>,
) {
    for (key, value) in map {
        path.push(escape_segment(key));
        match value {
            Value::String(markdown) if key.starts_with(marker) => {
                found.push(MarkdownFieldRef {
                    path: path.join("."),
                    key,
                    markdown,
                });
            }
            Value::Object(inner) => walk(inner, marker, path, found),
            _ => {}
        }
        path.pop();
    }
}

/// Build the node for one extracted field.
pub fn markdown_field_node(parent: &NodeId, field: &MarkdownFieldRef<'_>) -> ContentNode {
    let mut payload = Map::new();
    payload.insert("markdown".into(), Value::from(field.markdown));
    payload.insert("fieldPath".into(), Value::from(field.path.as_str()));
    payload.insert("key".into(), Value::from(field.key));
    ContentNode::new(
        NodeId::derived(parent, ID_KIND, &field.path),
        MARKDOWN_FIELD_TYPE,
        payload,
        text_digest(field.markdown),
    )
    .with_parent(parent.clone())
    .with_media_type("text/markdown")
}

/// Whether a node's payload is scanned for markdown fields.
fn is_extractable(node: &ContentNode) -> bool {
    !node.is_file()
        && !node.is_synthesized()
        && (node.node_type == MARKDOWN_TYPE || node.node_type.ends_with("Json"))
}

pub struct MarkdownFieldPlugin;

impl Plugin for MarkdownFieldPlugin {
    fn name(&self) -> &'static str {
        "markdown-fields"
    }

    fn on_create_node(&self, node: &ContentNode, ctx: &NodeContext<'_>, actions: &mut Actions) {
        if !is_extractable(node) {
            return;
        }
        for field in find_markdown_fields(&node.payload, &ctx.config.markdown.field_marker) {
            tracing::trace!(node = %node.id, path = %field.path, "Extracted markdown field");
            actions.create_node(markdown_field_node(&node.id, &field));
        }
    }
}
