//! In-memory content node graph.
//!
//! Every piece of content the build knows about is a [`ContentNode`]: files
//! found by the scanner, markdown documents and JSON records parsed from those
//! files, and nodes synthesized by the per-node pass (extracted markdown
//! fields, inlined SVG markup).
//!
//! The graph is append-only during a build. Nodes are created once and never
//! rewritten; the only later changes are attaching write-once fields and
//! linking children. A rebuild starts from a fresh graph.
//!
//! ## Node identity
//!
//! Ids are derived from stable inputs (relative file paths, key paths inside
//! a payload), so re-running the pipeline over unchanged content produces the
//! same ids. Re-creating an existing node with the same type and digest is a
//! no-op; re-creating it with different content is a [`GraphError::Conflict`].
//!
//! ## Per-node actions
//!
//! Plugins never mutate the graph directly. During the per-node pass they read
//! an immutable graph and record [`Actions`], which the build runner applies
//! once the round is over.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Type tag of nodes representing files in the content directory.
pub const FILE_TYPE: &str = "File";
/// Type tag of markdown documents parsed from `.md` files.
pub const MARKDOWN_TYPE: &str = "Markdown";
/// Type tag of markdown strings extracted from marker-keyed payload fields.
pub const MARKDOWN_FIELD_TYPE: &str = "MarkdownField";
/// Type tag of optimized inline SVG markup.
pub const INLINE_SVG_TYPE: &str = "InlineSvg";

#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    MissingNode(NodeId),
    #[error("Node {0} already exists with different content")]
    Conflict(NodeId),
    #[error("Field '{field}' on node {node} is already set to a different value")]
    FieldConflict { node: NodeId, field: String },
}

/// Unique, stable node identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of a node synthesized from `parent`, scoped by `kind` and a key.
    ///
    /// ```text
    /// markdown:blog/post.md  +  md  +  frontmatter.md_intro
    ///   →  markdown:blog/post.md>md:frontmatter.md_intro
    /// ```
    pub fn derived(parent: &NodeId, kind: &str, key: &str) -> Self {
        Self(format!("{parent}>{kind}:{key}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of content in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,
    /// Type-specific content: file metadata, frontmatter, a JSON record, ...
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Fields attached after creation (slug, rendered html, display date).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    pub content_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl ContentNode {
    pub fn new(
        id: NodeId,
        node_type: impl Into<String>,
        payload: Map<String, Value>,
        content_digest: String,
    ) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            parent: None,
            children: Vec::new(),
            payload,
            fields: Map::new(),
            content_digest,
            media_type: None,
        }
    }

    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn is_file(&self) -> bool {
        self.node_type == FILE_TYPE
    }

    /// Nodes created by the per-node pass rather than by the scanner.
    pub fn is_synthesized(&self) -> bool {
        matches!(
            self.node_type.as_str(),
            MARKDOWN_FIELD_TYPE | INLINE_SVG_TYPE
        )
    }

    /// Resolve a dotted field path against the node.
    ///
    /// `fields.<name>` reads an attached field; any other path walks the
    /// payload (`frontmatter.date`, `link`, ...).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = if first == "fields" {
            self.fields.get(segments.next()?)?
        } else {
            self.payload.get(first)?
        };
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// [`get_path`](Self::get_path) narrowed to string values.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get_path(path).and_then(Value::as_str)
    }

    /// An attached field as a string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// The append-only node store.
#[derive(Debug, Clone, Default)]
pub struct NodeGraph {
    nodes: BTreeMap<NodeId, ContentNode>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&ContentNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ContentNode> {
        self.nodes.values()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn nodes_of_type<'a>(&'a self, node_type: &'a str) -> impl Iterator<Item = &'a ContentNode> {
        self.nodes.values().filter(move |n| n.node_type == node_type)
    }

    /// Count of nodes per type tag, sorted by type.
    pub fn type_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.values() {
            *counts.entry(node.node_type.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn parent_of(&self, node: &ContentNode) -> Option<&ContentNode> {
        node.parent.as_ref().and_then(|p| self.nodes.get(p))
    }

    /// Walk up the parent chain to the originating file node.
    pub fn file_ancestor(&self, node: &ContentNode) -> Option<&ContentNode> {
        let mut current = self.parent_of(node)?;
        loop {
            if current.is_file() {
                return Some(current);
            }
            current = self.parent_of(current)?;
        }
    }

    /// Insert a node and link it under its parent.
    ///
    /// Returns `Ok(true)` when the node is new and `Ok(false)` when an
    /// identical node (same type and digest) already exists.
    pub fn create_node(&mut self, node: ContentNode) -> Result<bool, GraphError> {
        if let Some(parent) = &node.parent
            && !self.nodes.contains_key(parent)
        {
            return Err(GraphError::MissingNode(parent.clone()));
        }

        if let Some(existing) = self.nodes.get(&node.id) {
            if existing.node_type == node.node_type
                && existing.content_digest == node.content_digest
            {
                return Ok(false);
            }
            return Err(GraphError::Conflict(node.id));
        }

        let id = node.id.clone();
        let parent = node.parent.clone();
        self.nodes.insert(id.clone(), node);
        if let Some(parent) = parent {
            self.link_child(&parent, &id)?;
        }
        Ok(true)
    }

    /// Append `child` to `parent`'s child list (once).
    pub fn link_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| GraphError::MissingNode(parent.clone()))?;
        if !node.children.contains(child) {
            node.children.push(child.clone());
        }
        Ok(())
    }

    /// Attach a write-once field to a node.
    ///
    /// Setting a field to the value it already holds is accepted.
    pub fn add_field(&mut self, id: &NodeId, name: &str, value: Value) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::MissingNode(id.clone()))?;
        match node.fields.get(name) {
            Some(existing) if *existing == value => Ok(()),
            Some(_) => Err(GraphError::FieldConflict {
                node: id.clone(),
                field: name.to_string(),
            }),
            None => {
                node.fields.insert(name.to_string(), value);
                Ok(())
            }
        }
    }
}

/// Changes recorded by plugins for one node during the per-node pass.
#[derive(Debug, Default)]
pub struct Actions {
    nodes: Vec<ContentNode>,
    fields: Vec<(NodeId, String, Value)>,
}

impl Actions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a node for creation. Its `parent` must already exist.
    pub fn create_node(&mut self, node: ContentNode) {
        self.nodes.push(node);
    }

    pub fn add_field(&mut self, node: &NodeId, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((node.clone(), name.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.fields.is_empty()
    }

    pub fn created(&self) -> &[ContentNode] {
        &self.nodes
    }

    pub fn fields(&self) -> impl Iterator<Item = (&NodeId, &str, &Value)> {
        self.fields.iter().map(|(id, name, value)| (id, name.as_str(), value))
    }

    /// Append the recorded changes to `graph`.
    ///
    /// Nodes are created before fields are attached. Returns the ids of the
    /// nodes that did not exist before.
    pub fn apply(self, graph: &mut NodeGraph) -> Result<Vec<NodeId>, GraphError> {
        let mut created = Vec::new();
        for node in self.nodes {
            let id = node.id.clone();
            if graph.create_node(node)? {
                created.push(id);
            }
        }
        for (id, name, value) in self.fields {
            graph.add_field(&id, &name, value)?;
        }
        Ok(created)
    }
}
