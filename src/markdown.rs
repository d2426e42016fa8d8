//! Markdown rendering with image path rewriting.
//!
//! Markdown documents and extracted markdown fields are rendered to HTML with
//! pulldown-cmark and attached as an `html` field. Authors write image paths
//! relative to the markdown file (`![](./diagram.png)`); the published site
//! serves content media under `[markdown] image_prefix`, so relative image
//! URLs are resolved against the file's directory and rewritten:
//!
//! ```text
//! media/blog/post.md:  ![](./img/a.png)    →  /assets/media/blog/img/a.png
//! media/blog/post.md:  ![](../shared.png)  →  /assets/media/shared.png
//! anywhere:            ![](/logo.png)      →  unchanged
//! anywhere:            ![](https://x/y.png)→  unchanged
//! ```

use crate::graph::{Actions, ContentNode, MARKDOWN_FIELD_TYPE, MARKDOWN_TYPE, NodeGraph};
use crate::pipeline::{NodeContext, Plugin};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html as md_html};

/// Name of the attached rendered HTML field.
pub const HTML_FIELD: &str = "html";

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// Whether an image URL is resolved against the markdown file.
pub fn is_relative_url(url: &str) -> bool {
    !(url.is_empty()
        || url.starts_with('/')
        || url.starts_with('#')
        || url.contains("://")
        || url.starts_with("data:")
        || url.starts_with("mailto:"))
}

/// Resolve `url` against `directory` (relative to the content root) and put
/// it under `prefix`. `..` segments never climb above the content root.
pub fn rewrite_image_url(url: &str, directory: &str, prefix: &str) -> String {
    let (path, suffix) = match url.find(['?', '#']) {
        Some(i) => url.split_at(i),
        None => (url, ""),
    };
    let mut segments: Vec<&str> = directory.split('/').filter(|s| !s.is_empty()).collect();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!(
        "{}/{}{}",
        prefix.trim_end_matches('/'),
        segments.join("/"),
        suffix
    )
}

/// Render markdown to HTML, rewriting relative image URLs.
pub fn render_markdown(markdown: &str, directory: &str, image_prefix: &str) -> String {
    let parser = Parser::new_ext(markdown, parser_options()).map(|event| match event {
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) if is_relative_url(&dest_url) => Event::Start(Tag::Image {
            link_type,
            dest_url: CowStr::from(rewrite_image_url(&dest_url, directory, image_prefix)),
            title,
            id,
        }),
        other => other,
    });
    let mut html = String::with_capacity(markdown.len() * 3 / 2);
    md_html::push_html(&mut html, parser);
    html
}

/// Directory of the file a node was loaded from, relative to the content root.
fn source_directory<'a>(node: &ContentNode, graph: &'a NodeGraph) -> Option<&'a str> {
    graph
        .file_ancestor(node)
        .and_then(|file| file.get_str("relativeDirectory"))
}

/// Attaches rendered HTML to markdown documents and extracted fields.
pub struct MarkdownPlugin;

impl Plugin for MarkdownPlugin {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn on_create_node(&self, node: &ContentNode, ctx: &NodeContext<'_>, actions: &mut Actions) {
        let source = match node.node_type.as_str() {
            MARKDOWN_TYPE => node.get_str("rawMarkdownBody"),
            MARKDOWN_FIELD_TYPE => node.get_str("markdown"),
            _ => return,
        };
        let Some(source) = source else {
            return;
        };
        let directory = source_directory(node, ctx.graph).unwrap_or_else(|| {
            tracing::warn!(node = %node.id, "No source file, resolving images from the content root");
            ""
        });
        let html = render_markdown(source, directory, &ctx.config.markdown.image_prefix);
        actions.add_field(&node.id, HTML_FIELD, html);
    }
}
