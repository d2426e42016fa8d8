//! Content directory scanning.
//!
//! Walks the content root and loads every file into a fresh [`NodeGraph`].
//! This is the only place the build touches the filesystem for content; every
//! later step works on nodes.
//!
//! ## Directory Structure
//!
//! ```text
//! content/                          # Content root
//! ├── config.toml                   # Site configuration (not loaded as content)
//! ├── pages/
//! │   ├── about.json                # Object → one PagesJson record
//! │   └── contact.json
//! ├── team.json                     # Array → one TeamJson record per element
//! ├── media/
//! │   ├── blog/
//! │   │   └── hello-world.md        # Markdown with YAML frontmatter
//! │   └── news/
//! │       └── launch.md
//! └── icons/
//!     └── logo.svg                  # Inlined by the SVG plugin
//! ```
//!
//! ## Nodes
//!
//! Every file yields a `File` node (`file:<relative path>`). In addition:
//!
//! - `.md` files yield a `Markdown` child (`markdown:<path>`) with
//!   `frontmatter` and `rawMarkdownBody`.
//! - `.json` files holding an object yield one record child (`json:<path>`);
//!   files holding an array yield one child per object element
//!   (`json:<path>#<index>`). See [`naming::json_type_name`] for type names.
//!
//! Hidden files and directories (leading `.`) and the root `config.toml` are
//! skipped. Malformed frontmatter or JSON is an error: the build should not
//! silently drop content.

use crate::cache::content_digest;
use crate::graph::{ContentNode, FILE_TYPE, GraphError, MARKDOWN_TYPE, NodeGraph, NodeId};
use crate::naming::{self, FileName};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Content directory not found: {0}")]
    MissingSource(PathBuf),
    #[error("Invalid frontmatter in {path}: {source}")]
    Frontmatter {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Frontmatter in {0} is not a mapping")]
    FrontmatterShape(PathBuf),
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

const CONFIG_FILE: &str = "config.toml";

/// Load the content tree under `root` into a new graph.
pub fn scan(root: &Path) -> Result<NodeGraph, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::MissingSource(root.to_path_buf()));
    }

    let mut graph = NodeGraph::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if relative == Path::new(CONFIG_FILE) {
            continue;
        }
        load_file(&mut graph, entry.path(), relative)?;
    }

    tracing::debug!(root = %root.display(), nodes = graph.len(), "Scanned content");
    Ok(graph)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn load_file(graph: &mut NodeGraph, path: &Path, relative: &Path) -> Result<(), ScanError> {
    let bytes = fs::read(path)?;
    let name = naming::parse_file_name(relative);
    let file = file_node(&name, &bytes);
    let file_id = file.id.clone();
    graph.create_node(file)?;

    match name.extension.as_str() {
        "md" | "markdown" => {
            let text = String::from_utf8_lossy(&bytes);
            let (frontmatter, body) = parse_markdown(&text, path)?;
            let node = markdown_node(&file_id, &name, frontmatter, body, content_digest(&bytes));
            graph.create_node(node)?;
        }
        "json" => {
            let value: Value = serde_json::from_slice(&bytes).map_err(|source| ScanError::Json {
                path: path.to_path_buf(),
                source,
            })?;
            for node in record_nodes(&file_id, &name, value) {
                graph.create_node(node)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Media type advertised on file nodes, by extension.
fn media_type_for(extension: &str) -> Option<&'static str> {
    match extension {
        "md" | "markdown" => Some("text/markdown"),
        "json" => Some("application/json"),
        "svg" => Some("image/svg+xml"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

pub(crate) fn file_node(name: &FileName, bytes: &[u8]) -> ContentNode {
    let payload = json!({
        "relativePath": name.relative_path,
        "relativeDirectory": name.relative_directory,
        "name": name.name,
        "extension": name.extension,
        "size": bytes.len(),
    });
    let node = ContentNode::new(
        NodeId::new(format!("file:{}", name.relative_path)),
        FILE_TYPE,
        into_map(payload),
        content_digest(bytes),
    );
    match media_type_for(&name.extension) {
        Some(media_type) => node.with_media_type(media_type),
        None => node,
    }
}

pub(crate) fn markdown_node(
    file_id: &NodeId,
    name: &FileName,
    frontmatter: Map<String, Value>,
    body: &str,
    digest: String,
) -> ContentNode {
    let payload = json!({
        "frontmatter": frontmatter,
        "rawMarkdownBody": body,
    });
    ContentNode::new(
        NodeId::new(format!("markdown:{}", name.relative_path)),
        MARKDOWN_TYPE,
        into_map(payload),
        digest,
    )
    .with_parent(file_id.clone())
    .with_media_type("text/markdown")
}

/// Record nodes for a parsed JSON file. Non-object values are skipped.
pub(crate) fn record_nodes(file_id: &NodeId, name: &FileName, value: Value) -> Vec<ContentNode> {
    match value {
        Value::Object(record) => {
            let node_type = naming::json_type_name(name, false);
            let id = NodeId::new(format!("json:{}", name.relative_path));
            vec![record_node(file_id, id, node_type, record)]
        }
        Value::Array(items) => {
            let node_type = naming::json_type_name(name, true);
            items
                .into_iter()
                .enumerate()
                .filter_map(|(index, item)| match item {
                    Value::Object(record) => {
                        let id = NodeId::new(format!("json:{}#{index}", name.relative_path));
                        Some(record_node(file_id, id, node_type.clone(), record))
                    }
                    _ => {
                        tracing::warn!(
                            file = %name.relative_path,
                            index,
                            "Skipping non-object array element"
                        );
                        None
                    }
                })
                .collect()
        }
        _ => {
            tracing::warn!(file = %name.relative_path, "JSON file holds neither an object nor an array");
            Vec::new()
        }
    }
}

pub(crate) fn record_node(
    file_id: &NodeId,
    id: NodeId,
    node_type: String,
    record: Map<String, Value>,
) -> ContentNode {
    let digest = content_digest(Value::Object(record.clone()).to_string().as_bytes());
    ContentNode::new(id, node_type, record, digest)
        .with_parent(file_id.clone())
        .with_media_type("application/json")
}

/// Split a markdown document into its YAML frontmatter mapping and body.
///
/// Frontmatter is only recognized when the document starts with a `---`
/// line and a closing `---` line follows. Otherwise the whole text is the
/// body and the frontmatter is empty.
pub fn parse_markdown<'a>(
    text: &'a str,
    path: &Path,
) -> Result<(Map<String, Value>, &'a str), ScanError> {
    let Some((yaml, body)) = split_frontmatter(text) else {
        return Ok((Map::new(), text));
    };
    if yaml.trim().is_empty() {
        return Ok((Map::new(), body));
    }
    let value: Value = serde_yaml::from_str(yaml).map_err(|source| ScanError::Frontmatter {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok((map, body)),
        Value::Null => Ok((Map::new(), body)),
        _ => Err(ScanError::FrontmatterShape(path.to_path_buf())),
    }
}

fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text
        .strip_prefix("---\r\n")
        .or_else(|| text.strip_prefix("---\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use tempfile::TempDir;

    fn node<'a>(graph: &'a NodeGraph, id: &str) -> &'a ContentNode {
        graph
            .get(&NodeId::new(id))
            .unwrap_or_else(|| panic!("missing node {id}"))
    }

    #[test]
    fn scan_fixtures_loads_all_files() {
        let tmp = setup_fixtures();
        let graph = scan(tmp.path()).unwrap();
        let counts = graph.type_counts();
        assert_eq!(counts.get("PagesJson"), Some(&2));
        assert_eq!(counts.get("TeamJson"), Some(&2));
        assert!(counts.get("Markdown").copied().unwrap_or(0) >= 3);
        assert!(!graph.contains(&NodeId::new("file:config.toml")));
    }

    #[test]
    fn file_payload_describes_path() {
        let tmp = TempDir::new().unwrap();
        write_content(tmp.path(), "media/blog/Hello.MD", "# Hi\n");
        let graph = scan(tmp.path()).unwrap();

        let file = node(&graph, "file:media/blog/Hello.MD");
        assert_eq!(file.get_str("relativeDirectory"), Some("media/blog"));
        assert_eq!(file.get_str("name"), Some("Hello"));
        assert_eq!(file.get_str("extension"), Some("md"));
        assert_eq!(file.get_path("size"), Some(&json!(5)));
        assert_eq!(file.media_type.as_deref(), Some("text/markdown"));
        assert_eq!(file.children, vec![NodeId::new("markdown:media/blog/Hello.MD")]);
    }

    #[test]
    fn markdown_frontmatter_is_parsed() {
        let tmp = TempDir::new().unwrap();
        write_content(
            tmp.path(),
            "post.md",
            "---\ntitle: Hello\ndate: 2024-03-01\ntags: [a, b]\n---\nBody text\n",
        );
        let graph = scan(tmp.path()).unwrap();

        let md = node(&graph, "markdown:post.md");
        assert_eq!(md.get_str("frontmatter.title"), Some("Hello"));
        assert_eq!(md.get_str("frontmatter.date"), Some("2024-03-01"));
        assert_eq!(md.get_path("frontmatter.tags"), Some(&json!(["a", "b"])));
        assert_eq!(md.get_str("rawMarkdownBody"), Some("Body text\n"));
        assert_eq!(md.parent, Some(NodeId::new("file:post.md")));
    }

    #[test]
    fn markdown_without_frontmatter() {
        let (frontmatter, body) = parse_markdown("# Title\n\ntext", Path::new("x.md")).unwrap();
        assert!(frontmatter.is_empty());
        assert_eq!(body, "# Title\n\ntext");
    }

    #[test]
    fn unterminated_frontmatter_is_body() {
        let text = "---\ntitle: x\nno closing fence";
        let (frontmatter, body) = parse_markdown(text, Path::new("x.md")).unwrap();
        assert!(frontmatter.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn empty_frontmatter_block() {
        let (frontmatter, body) = parse_markdown("---\n---\nbody", Path::new("x.md")).unwrap();
        assert!(frontmatter.is_empty());
        assert_eq!(body, "body");
    }

    #[test]
    fn invalid_frontmatter_is_error() {
        let result = parse_markdown("---\ntitle: [unclosed\n---\n", Path::new("x.md"));
        assert!(matches!(result, Err(ScanError::Frontmatter { .. })));
    }

    #[test]
    fn scalar_frontmatter_is_error() {
        let result = parse_markdown("---\njust a string\n---\n", Path::new("x.md"));
        assert!(matches!(result, Err(ScanError::FrontmatterShape(_))));
    }

    #[test]
    fn object_json_typed_by_directory() {
        let tmp = TempDir::new().unwrap();
        write_content(tmp.path(), "pages/about.json", r#"{"link": "/about"}"#);
        let graph = scan(tmp.path()).unwrap();

        let record = node(&graph, "json:pages/about.json");
        assert_eq!(record.node_type, "PagesJson");
        assert_eq!(record.get_str("link"), Some("/about"));
    }

    #[test]
    fn array_json_yields_one_node_per_object() {
        let tmp = TempDir::new().unwrap();
        write_content(
            tmp.path(),
            "team-members.json",
            r#"[{"name": "A"}, 42, {"name": "B"}]"#,
        );
        let graph = scan(tmp.path()).unwrap();

        let records: Vec<_> = graph.nodes_of_type("TeamMembersJson").collect();
        assert_eq!(records.len(), 2);
        assert!(graph.contains(&NodeId::new("json:team-members.json#0")));
        assert!(graph.contains(&NodeId::new("json:team-members.json#2")));
    }

    #[test]
    fn invalid_json_is_error() {
        let tmp = TempDir::new().unwrap();
        write_content(tmp.path(), "pages/broken.json", "{ nope");
        assert!(matches!(scan(tmp.path()), Err(ScanError::Json { .. })));
    }

    #[test]
    fn hidden_entries_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write_content(tmp.path(), ".git/config", "x");
        write_content(tmp.path(), "media/.draft.md", "x");
        write_content(tmp.path(), "media/visible.md", "x");
        let graph = scan(tmp.path()).unwrap();
        assert_eq!(graph.nodes_of_type(FILE_TYPE).count(), 1);
    }

    #[test]
    fn missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = scan(&tmp.path().join("nope"));
        assert!(matches!(result, Err(ScanError::MissingSource(_))));
    }

    #[test]
    fn rescanning_yields_identical_graph() {
        let tmp = setup_fixtures();
        let first = scan(tmp.path()).unwrap();
        let second = scan(tmp.path()).unwrap();
        assert_eq!(first.ids(), second.ids());
        for node in first.iter() {
            assert_eq!(
                second.get(&node.id).unwrap().content_digest,
                node.content_digest
            );
        }
    }
}
