//! # sitegraph
//!
//! The build-time data layer of a static website. Content files become a
//! graph of typed nodes, plugins enrich that graph, and the enriched graph is
//! queried to decide which pages exist.
//!
//! # Architecture: Scan → Enrich → Route
//!
//! ```text
//! 1. Scan     content/   →  NodeGraph        (File, Markdown and *Json nodes)
//! 2. Enrich   NodeGraph  →  NodeGraph        (slugs, markdown fields, inline SVG, HTML, dates)
//! 3. Route    NodeGraph  →  routes.json      (static pages, media listings and items, news)
//! ```
//!
//! Deploy policies run next to the build and do not touch the graph:
//! `robots.txt` per deployment context, and analytics injection into the
//! rendered HTML.
//!
//! ## The enrichment pass
//!
//! Plugins never mutate the graph directly. During a round each plugin looks
//! at one node and records [`graph::Actions`] (child nodes to create, fields
//! to attach). Rounds visit nodes in parallel; actions are applied afterwards
//! in node-id order, so the resulting graph does not depend on scheduling.
//! Nodes created in one round are visited in the next, until no new nodes
//! appear.
//!
//! ## Identity
//!
//! Node ids are derived from what a node was built from: the file path for
//! scanned nodes, `parent>kind:key` for synthesized ones. Rebuilding unchanged
//! content reproduces the same ids and the same content digests, which is what
//! [`cache`] uses to report changes between builds.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Walks the content directory into `File`, `Markdown` and `*Json` nodes |
//! | [`graph`] | Node store, derived ids, recorded actions |
//! | [`pipeline`] | Plugin trait, fixpoint node pass, route collection |
//! | [`schema`] | Declared and inferred field types per node type |
//! | [`query`] | Filter/sort/skip/limit over a node type, validated against the schema |
//! | [`slug`] | `slug` field from the source file name |
//! | [`extract`] | Markdown-valued payload keys become `MarkdownField` nodes |
//! | [`svg`] | SVG files become optimized `InlineSvg` nodes |
//! | [`markdown`] | Renders markdown to HTML with image path rewriting |
//! | [`dates`] | Date parsing and the `date_display` field |
//! | [`routes`] | Route synthesis: static pages, paginated listings, item pages |
//! | [`robots`] | `robots.txt` per deployment context |
//! | [`analytics`] | Tracking snippet injection into rendered pages |
//! | [`cache`] | Content digests and change detection between builds |
//! | [`config`] | `config.toml` loading, validation and stock defaults |
//! | [`naming`] | File name parsing and `*Json` type naming |
//! | [`types`] | Route descriptors and the `routes.json` manifest |
//! | [`output`] | CLI output formatting |

pub mod analytics;
pub mod cache;
pub mod config;
pub mod dates;
pub mod extract;
pub mod graph;
pub mod markdown;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod robots;
pub mod routes;
pub mod scan;
pub mod schema;
pub mod slug;
pub mod svg;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
