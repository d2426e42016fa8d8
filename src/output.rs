//! CLI output formatting for build results.
//!
//! # Information-First Display
//!
//! Output leads with what the site *contains* (node types and their counts,
//! the pages that will exist) rather than with files. Detail lines are
//! indented under their header.
//!
//! # Output Format
//!
//! ## Build / Check
//!
//! ```text
//! Nodes
//!     File: 9
//!     Markdown: 4
//!     MarkdownField: 2
//!     PagesJson: 2
//! Pass: 3 rounds, 7 nodes synthesized
//! Routes
//!     static-page: 2
//!     media-listing: 1
//!     media-item: 2
//! ```
//!
//! ## Routes
//!
//! ```text
//! static-page    /about
//! media-listing  /media/blog
//! media-item     /media/blog/hello
//!                → https://elsewhere.example/  (external, no page)
//! ```
//!
//! ## Schema
//!
//! ```text
//! Markdown (4 nodes)
//!     fields.slug: String
//!     frontmatter.date: Date
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::graph::NodeGraph;
use crate::pipeline::{BuildOutput, PassStats};
use crate::schema::Schema;
use crate::types::{RouteDescriptor, Template};
use std::collections::BTreeMap;

const TEMPLATE_ORDER: [Template; 4] = [
    Template::StaticPage,
    Template::MediaListing,
    Template::MediaItem,
    Template::NewsListing,
];

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Build summary
// ============================================================================

/// Node counts per type, sorted by type name.
pub fn format_node_counts(graph: &NodeGraph) -> Vec<String> {
    let mut lines = vec!["Nodes".to_string()];
    for (node_type, count) in graph.type_counts() {
        lines.push(format!("{}{}: {}", indent(1), node_type, count));
    }
    if graph.is_empty() {
        lines.push(format!("{}(none)", indent(1)));
    }
    lines
}

pub fn format_pass_stats(pass: &PassStats) -> String {
    format!(
        "Pass: {}, {} synthesized",
        plural(pass.rounds, "round"),
        plural(pass.nodes_created, "node")
    )
}

/// Route counts per template, in rendering order. Templates without routes
/// are left out.
pub fn format_route_counts(routes: &[RouteDescriptor]) -> Vec<String> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for route in routes {
        let rank = TEMPLATE_ORDER
            .iter()
            .position(|t| *t == route.template)
            .unwrap_or(TEMPLATE_ORDER.len());
        *counts.entry(rank).or_insert(0) += 1;
    }
    let mut lines = vec!["Routes".to_string()];
    for (rank, count) in counts {
        if let Some(template) = TEMPLATE_ORDER.get(rank) {
            lines.push(format!("{}{}: {}", indent(1), template, count));
        }
    }
    if routes.is_empty() {
        lines.push(format!("{}(none)", indent(1)));
    }
    lines
}

/// Full summary of a finished build.
pub fn format_build_output(build: &BuildOutput) -> Vec<String> {
    let mut lines = format_node_counts(&build.graph);
    lines.push(format_pass_stats(&build.pass));
    lines.extend(format_route_counts(&build.routes));
    lines
}

pub fn print_build_output(build: &BuildOutput) {
    for line in format_build_output(build) {
        println!("{}", line);
    }
}

// ============================================================================
// Route listing
// ============================================================================

/// One line per route: template name padded to a column, then the path.
pub fn format_routes(routes: &[RouteDescriptor]) -> Vec<String> {
    let width = routes
        .iter()
        .map(|r| r.template.as_str().len())
        .max()
        .unwrap_or(0);
    routes
        .iter()
        .map(|r| format!("{:<width$}  {}", r.template.as_str(), r.path))
        .collect()
}

pub fn print_routes(routes: &[RouteDescriptor]) {
    for line in format_routes(routes) {
        println!("{}", line);
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Every known type with its node count and resolved fields.
pub fn format_schema(schema: &Schema, graph: &NodeGraph) -> Vec<String> {
    let counts = graph.type_counts();
    let mut lines = Vec::new();
    for name in schema.all_type_names(graph) {
        let count = counts.get(name.as_str()).copied().unwrap_or(0);
        lines.push(format!("{} ({})", name, plural(count, "node")));
        for (path, field_type) in schema.resolve_fields(graph, &name) {
            lines.push(format!("{}{}: {}", indent(1), path, field_type));
        }
    }
    lines
}

pub fn print_schema(schema: &Schema, graph: &NodeGraph) {
    for line in format_schema(schema, graph) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::test_helpers::*;
    use serde_json::json;

    fn route(path: &str, template: Template) -> RouteDescriptor {
        RouteDescriptor::new(path, template, json!({}))
    }

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "round"), "1 round");
        assert_eq!(plural(0, "round"), "0 rounds");
        assert_eq!(plural(3, "node"), "3 nodes");
    }

    #[test]
    fn node_counts_sorted_by_type() {
        let mut graph = NodeGraph::new();
        add_markdown(&mut graph, "a.md", json!({}), "");
        add_markdown(&mut graph, "b.md", json!({}), "");
        add_json_record(&mut graph, "pages/x.json", "PagesJson", json!({}));

        assert_eq!(
            format_node_counts(&graph),
            vec!["Nodes", "    File: 3", "    Markdown: 2", "    PagesJson: 1"]
        );
    }

    #[test]
    fn node_counts_empty_graph() {
        assert_eq!(format_node_counts(&NodeGraph::new()), vec!["Nodes", "    (none)"]);
    }

    #[test]
    fn pass_stats_line() {
        let pass = PassStats {
            rounds: 3,
            nodes_created: 1,
        };
        assert_eq!(format_pass_stats(&pass), "Pass: 3 rounds, 1 node synthesized");
    }

    #[test]
    fn route_counts_follow_template_order() {
        let routes = vec![
            route("/media/blog/a", Template::MediaItem),
            route("/media/news", Template::NewsListing),
            route("/about", Template::StaticPage),
            route("/media/blog/b", Template::MediaItem),
        ];
        assert_eq!(
            format_route_counts(&routes),
            vec![
                "Routes",
                "    static-page: 1",
                "    media-item: 2",
                "    news-listing: 1"
            ]
        );
    }

    #[test]
    fn routes_are_column_aligned() {
        let routes = vec![
            route("/about", Template::StaticPage),
            route("/media/blog", Template::MediaListing),
        ];
        assert_eq!(
            format_routes(&routes),
            vec!["static-page    /about", "media-listing  /media/blog"]
        );
    }

    #[test]
    fn routes_empty() {
        assert!(format_routes(&[]).is_empty());
    }

    #[test]
    fn schema_lists_types_and_fields() {
        let mut graph = NodeGraph::new();
        add_json_record(
            &mut graph,
            "pages/about.json",
            "PagesJson",
            json!({"link": "/about"}),
        );
        let mut schema = Schema::new();
        schema.define("PagesJson").field("fields.slug", FieldType::String);

        let lines = format_schema(&schema, &graph);
        let start = lines.iter().position(|l| l == "PagesJson (1 node)").unwrap();
        assert_eq!(lines[start + 1], "    fields.slug: String");
        assert_eq!(lines[start + 2], "    link: String");
        assert!(lines.contains(&"File (1 node)".to_string()));
    }
}
