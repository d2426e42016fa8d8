//! Route types shared by the route synthesizer, the build runner and the CLI.
//!
//! Routes are recomputed on every build and written to `routes.json` in the
//! output directory, where the site renderer picks them up.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Page template a route is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Template {
    /// A page backed by one page record.
    StaticPage,
    /// One page of a media category listing.
    MediaListing,
    /// Detail page of a single media item.
    MediaItem,
    /// One page of the news listing.
    NewsListing,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Template::StaticPage => "static-page",
            Template::MediaListing => "media-listing",
            Template::MediaItem => "media-item",
            Template::NewsListing => "news-listing",
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page to be rendered: URL path, template and the template's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    pub path: String,
    pub template: Template,
    pub context: Value,
}

impl RouteDescriptor {
    pub fn new(path: impl Into<String>, template: Template, context: Value) -> Self {
        Self {
            path: path.into(),
            template,
            context,
        }
    }
}

/// The `routes.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteManifest {
    /// Build version string of the tool that wrote the manifest.
    pub generator: String,
    pub routes: Vec<RouteDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn template_serializes_kebab_case() {
        let route = RouteDescriptor::new("/media/blog", Template::MediaListing, json!({}));
        let value = serde_json::to_value(&route).unwrap();
        assert_eq!(value["template"], "media-listing");
    }

    #[test]
    fn template_display_matches_serde_name() {
        for template in [
            Template::StaticPage,
            Template::MediaListing,
            Template::MediaItem,
            Template::NewsListing,
        ] {
            let serialized = serde_json::to_value(template).unwrap();
            assert_eq!(serialized, template.to_string());
        }
    }
}
