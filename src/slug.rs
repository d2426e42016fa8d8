//! Slug assignment.
//!
//! Nodes of the types listed in `[slugs] types` get a `slug` field equal to
//! the base name of the file they were loaded from (`blog/hello-world.md` →
//! `hello-world`). Route generation uses it for media item URLs.

use crate::graph::{Actions, ContentNode};
use crate::pipeline::{NodeContext, Plugin};

/// Name of the attached slug field.
pub const SLUG_FIELD: &str = "slug";

/// The slug for `node`, or `None` when its file cannot be resolved.
pub fn slug_for(node: &ContentNode, ctx: &NodeContext<'_>) -> Option<String> {
    let file = ctx.graph.file_ancestor(node)?;
    file.get_str("name").map(str::to_string)
}

pub struct SlugPlugin;

impl Plugin for SlugPlugin {
    fn name(&self) -> &'static str {
        "slugs"
    }

    fn on_create_node(&self, node: &ContentNode, ctx: &NodeContext<'_>, actions: &mut Actions) {
        if !ctx.config.slugs.types.contains(&node.node_type) {
            return;
        }
        match slug_for(node, ctx) {
            Some(slug) => actions.add_field(&node.id, SLUG_FIELD, slug),
            None => {
                tracing::warn!(node = %node.id, "No source file for node, leaving it without a slug");
            }
        }
    }
}
