//! Shared test utilities for the sitegraph test suite.
//!
//! Provides fixture setup, graph builders that produce nodes exactly the way
//! the scanner does, and stub collaborators for the SVG plugin.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let mut graph = NodeGraph::new();
//! let post = add_markdown(&mut graph, "media/blog/hello.md", json!({"category": "blog"}), "Hi");
//! add_json_record(&mut graph, "pages/about.json", "PagesJson", json!({"link": "/about"}));
//! add_media_items(&mut graph, "news", 16, &[]);
//! ```

use serde_json::{Map, Value};
use std::path::Path;
use tempfile::TempDir;

use crate::graph::{ContentNode, NodeGraph, NodeId};
use crate::naming::parse_file_name;
use crate::scan;
use crate::slug::SLUG_FIELD;
use crate::svg::{ContentLoader, LoadError};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/content/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/content");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write a content file under `root`, creating parent directories.
pub fn write_content(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

// =========================================================================
// Graph builders — same ids and payloads as the scanner
// =========================================================================

/// Add a `File` node with empty content.
pub fn add_file(graph: &mut NodeGraph, relative: &str) -> NodeId {
    let file = scan::file_node(&parse_file_name(Path::new(relative)), b"");
    let id = file.id.clone();
    graph.create_node(file).unwrap();
    id
}

/// Add a `.md` file plus its `Markdown` node. Returns the markdown node id.
pub fn add_markdown(graph: &mut NodeGraph, relative: &str, frontmatter: Value, body: &str) -> NodeId {
    let name = parse_file_name(Path::new(relative));
    let file_id = add_file(graph, relative);
    let node = scan::markdown_node(&file_id, &name, as_map(frontmatter), body, format!("md:{relative}"));
    let id = node.id.clone();
    graph.create_node(node).unwrap();
    id
}

/// Add a `.json` file plus one record node of `node_type`.
pub fn add_json_record(graph: &mut NodeGraph, relative: &str, node_type: &str, record: Value) -> NodeId {
    let file_id = add_file(graph, relative);
    let node = scan::record_node(
        &file_id,
        NodeId::new(format!("json:{relative}")),
        node_type.to_string(),
        as_map(record),
    );
    let id = node.id.clone();
    graph.create_node(node).unwrap();
    id
}

/// Add `count` slugged media items `post-01`, `post-02`, ... to a category.
///
/// Item `n` is dated 2024-01-`n`, so later items sort first. Items whose
/// 1-based number is in `external` link out.
pub fn add_media_items(graph: &mut NodeGraph, category: &str, count: usize, external: &[usize]) {
    for n in 1..=count {
        let slug = format!("post-{n:02}");
        let mut frontmatter = serde_json::json!({
            "title": format!("Post {n}"),
            "category": category,
            "date": format!("2024-01-{n:02}"),
        });
        if external.contains(&n) {
            frontmatter["external_link"] = Value::from(format!("https://elsewhere.example/{n}"));
        }
        let id = add_markdown(
            graph,
            &format!("media/{category}/{slug}.md"),
            frontmatter,
            "Body",
        );
        graph.add_field(&id, SLUG_FIELD, Value::from(slug)).unwrap();
    }
}

fn as_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// =========================================================================
// Stub collaborators
// =========================================================================

/// Loads nothing: every file is empty.
pub struct NoContent;

impl ContentLoader for NoContent {
    fn load(&self, _node: &ContentNode) -> Result<Vec<u8>, LoadError> {
        Ok(Vec::new())
    }
}

/// Loads the same content for every file.
pub struct FixedContent(pub String);

impl ContentLoader for FixedContent {
    fn load(&self, _node: &ContentNode) -> Result<Vec<u8>, LoadError> {
        Ok(self.0.clone().into_bytes())
    }
}
