//! Site configuration module.
//!
//! Handles loading, validating, and merging the `config.toml` found in the
//! content root. Stock defaults are serialized to a TOML table and the user's
//! file is merged on top of it key by key, so a config file only needs the
//! values it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [markdown]
//! field_marker = "md_"        # Payload keys with this prefix hold markdown
//! image_prefix = "/assets"    # Public URL prefix for rewritten image paths
//!
//! [slugs]
//! types = ["Markdown", "PagesJson"]
//!
//! [routes]
//! base_path = "/media"
//! pages_type = "PagesJson"
//! page_link_field = "link"
//! category_field = "frontmatter.category"
//! date_field = "frontmatter.date"
//! external_link_field = "frontmatter.external_link"
//! page_size = 10
//! news_page_size = 15
//!
//! [[routes.categories]]
//! name = "announcements"
//! title = "Announcements"
//!
//! [[routes.categories]]
//! name = "blog"
//! title = "Blog"
//!
//! [dates]
//! display_format = "%B %-d, %Y"
//!
//! [robots]
//! production_context = "production"
//! # host = "https://www.example.org"
//! sitemap = "/sitemap.xml"
//!
//! [analytics]
//! # tracking_id = "G-XXXXXXX"
//! contexts = ["production"]
//!
//! [processing]
//! max_processes = 4           # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Category whose listings are generated by the news phase, never by the
/// per-category media phase.
pub const NEWS_CATEGORY: &str = "news";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Markdown field extraction and rendering.
    pub markdown: MarkdownConfig,
    /// Which node types receive a slug.
    pub slugs: SlugsConfig,
    /// Page route generation.
    pub routes: RoutesConfig,
    /// Date display formatting.
    pub dates: DatesConfig,
    /// `robots.txt` policy per deployment context.
    pub robots: RobotsConfig,
    /// Analytics snippet injection.
    pub analytics: AnalyticsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.markdown.field_marker.is_empty() {
            return Err(ConfigError::Validation(
                "markdown.field_marker must not be empty".into(),
            ));
        }
        if self.routes.page_size == 0 || self.routes.news_page_size == 0 {
            return Err(ConfigError::Validation(
                "routes.page_size and routes.news_page_size must be non-zero".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for category in &self.routes.categories {
            if category.name.is_empty() {
                return Err(ConfigError::Validation(
                    "routes.categories entries need a name".into(),
                ));
            }
            if category.name == NEWS_CATEGORY {
                return Err(ConfigError::Validation(format!(
                    "routes.categories must not contain '{NEWS_CATEGORY}' (news has its own listing)"
                )));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate category '{}' in routes.categories",
                    category.name
                )));
            }
        }
        if let Some(id) = &self.analytics.tracking_id
            && (id.is_empty()
                || !id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        {
            return Err(ConfigError::Validation(format!(
                "analytics.tracking_id may only contain letters, digits, '-' and '_': {id}"
            )));
        }
        if StrftimeItems::new(&self.dates.display_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Validation(format!(
                "dates.display_format is not a valid format string: {}",
                self.dates.display_format
            )));
        }
        Ok(())
    }
}

/// Markdown field extraction and rendering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkdownConfig {
    /// Payload keys starting with this marker hold markdown strings.
    pub field_marker: String,
    /// Public URL prefix that relative image paths are rewritten under.
    pub image_prefix: String,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            field_marker: "md_".to_string(),
            image_prefix: "/assets".to_string(),
        }
    }
}

/// Slug assignment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlugsConfig {
    /// Node types that receive a `slug` field from their file's base name.
    pub types: Vec<String>,
}

impl Default for SlugsConfig {
    fn default() -> Self {
        Self {
            types: vec!["Markdown".to_string(), "PagesJson".to_string()],
        }
    }
}

/// A media category with its own paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryConfig {
    /// Value of the category field on content items (and URL segment).
    pub name: String,
    /// Display title passed to listing templates.
    pub title: String,
}

/// Route generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutesConfig {
    /// URL prefix for media listings and item pages.
    pub base_path: String,
    /// Node type of static page records.
    pub pages_type: String,
    /// Payload path of a page record's navigation link.
    pub page_link_field: String,
    /// Field path holding a media item's category.
    pub category_field: String,
    /// Field path of the date media listings are sorted by (newest first).
    pub date_field: String,
    /// Field path whose presence marks an item as linking out.
    pub external_link_field: String,
    /// Items per media category listing page.
    pub page_size: usize,
    /// Items per news listing page.
    pub news_page_size: usize,
    /// Title of the news listing.
    pub news_title: String,
    /// Media categories, in generation order.
    pub categories: Vec<CategoryConfig>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            base_path: "/media".to_string(),
            pages_type: "PagesJson".to_string(),
            page_link_field: "link".to_string(),
            category_field: "frontmatter.category".to_string(),
            date_field: "frontmatter.date".to_string(),
            external_link_field: "frontmatter.external_link".to_string(),
            page_size: 10,
            news_page_size: 15,
            news_title: "News".to_string(),
            categories: vec![
                CategoryConfig {
                    name: "announcements".to_string(),
                    title: "Announcements".to_string(),
                },
                CategoryConfig {
                    name: "blog".to_string(),
                    title: "Blog".to_string(),
                },
            ],
        }
    }
}

/// Date display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatesConfig {
    /// `strftime`-style format of the `date_display` field.
    pub display_format: String,
}

impl Default for DatesConfig {
    fn default() -> Self {
        Self {
            display_format: "%B %-d, %Y".to_string(),
        }
    }
}

/// `robots.txt` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RobotsConfig {
    /// Deployment context that is crawlable. Every other context is closed.
    pub production_context: String,
    /// Canonical host advertised in production.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Sitemap path (or absolute URL) advertised in production.
    pub sitemap: String,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            production_context: "production".to_string(),
            host: None,
            sitemap: "/sitemap.xml".to_string(),
        }
    }
}

/// Analytics snippet settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// Tracking id. Nothing is injected when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    /// Deployment contexts whose pages get the snippet.
    pub contexts: Vec<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            tracking_id: None,
            contexts: vec!["production".to_string()],
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel node-pass workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely. Arrays,
///   including `[[routes.categories]]`, are replaced, not appended.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# sitegraph configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file at the root of the content directory. Unknown keys
# cause an error.

# ---------------------------------------------------------------------------
# Markdown
# ---------------------------------------------------------------------------
[markdown]
# Payload keys starting with this marker are treated as markdown and
# extracted into their own nodes (e.g. md_intro, md_body).
field_marker = "md_"

# Relative image paths inside markdown are resolved against the markdown
# file's directory and served under this URL prefix.
image_prefix = "/assets"

# ---------------------------------------------------------------------------
# Slugs
# ---------------------------------------------------------------------------
[slugs]
# Node types whose nodes get a `slug` field (the source file's base name).
types = ["Markdown", "PagesJson"]

# ---------------------------------------------------------------------------
# Routes
# ---------------------------------------------------------------------------
[routes]
# URL prefix for media listings and media item pages.
base_path = "/media"

# Node type of static page records and the field holding their URL.
pages_type = "PagesJson"
page_link_field = "link"

# Field paths on media items.
category_field = "frontmatter.category"
date_field = "frontmatter.date"
external_link_field = "frontmatter.external_link"

# Items per listing page.
page_size = 10
news_page_size = 15

# Title of the news listing (/media/news).
news_title = "News"

# Media categories, each with a paginated listing and item pages.
[[routes.categories]]
name = "announcements"
title = "Announcements"

[[routes.categories]]
name = "blog"
title = "Blog"

# ---------------------------------------------------------------------------
# Dates
# ---------------------------------------------------------------------------
[dates]
# strftime-style format of the `date_display` field.
display_format = "%B %-d, %Y"

# ---------------------------------------------------------------------------
# robots.txt
# ---------------------------------------------------------------------------
[robots]
# Only this deployment context may be crawled; every other context
# (previews, branch deploys) disallows all crawlers.
production_context = "production"

# Canonical host advertised in production.
# host = "https://www.example.org"

sitemap = "/sitemap.xml"

# ---------------------------------------------------------------------------
# Analytics
# ---------------------------------------------------------------------------
[analytics]
# Tracking id; nothing is injected while unset.
# tracking_id = "G-XXXXXXX"

# Deployment contexts whose pages receive the snippet.
contexts = ["production"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel node-pass workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_route_settings() {
        let config = SiteConfig::default();
        assert_eq!(config.routes.page_size, 10);
        assert_eq!(config.routes.news_page_size, 15);
        assert_eq!(config.routes.base_path, "/media");
        let names: Vec<&str> = config
            .routes
            .categories
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["announcements", "blog"]);
    }

    #[test]
    fn default_config_has_markdown_marker() {
        let config = SiteConfig::default();
        assert_eq!(config.markdown.field_marker, "md_");
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[routes]
page_size = 5
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.routes.page_size, 5);
        // Default values preserved
        assert_eq!(config.routes.news_page_size, 15);
        assert_eq!(config.markdown.field_marker, "md_");
    }

    #[test]
    fn categories_array_replaces_defaults() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r#"
[[routes.categories]]
name = "press"
title = "Press"
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.routes.categories.len(), 1);
        assert_eq!(config.routes.categories[0].name, "press");
        assert_eq!(config.routes.page_size, 10);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, SiteConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r#"
[robots]
host = "https://www.example.org"

[analytics]
tracking_id = "G-TEST"
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.robots.host.as_deref(), Some("https://www.example.org"));
        assert_eq!(config.analytics.tracking_id.as_deref(), Some("G-TEST"));
        // Unspecified values should be defaults
        assert_eq!(config.robots.sitemap, "/sitemap.xml");
        assert_eq!(config.analytics.contexts, vec!["production"]);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "this is not valid toml [[[").unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_zero_means_one() {
        let config = ProcessingConfig {
            max_processes: Some(0),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"page_size = 10"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"page_size = 20"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("page_size").unwrap().as_integer(), Some(20));
    }

    #[test]
    fn merge_toml_deep_nested() {
        let base: toml::Value = toml::from_str(
            r#"
[routes]
page_size = 10
news_page_size = 15
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[routes]
news_page_size = 30
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let routes = merged.get("routes").unwrap();
        assert_eq!(routes.get("news_page_size").unwrap().as_integer(), Some(30));
        assert_eq!(routes.get("page_size").unwrap().as_integer(), Some(10));
    }

    // =========================================================================
    // Unknown key rejection tests
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let toml_str = r#"
[routes]
page_sise = 10
"#;
        let result: Result<SiteConfig, _> = toml::from_str(toml_str);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let toml_str = r#"
[route]
page_size = 10
"#;
        let result: Result<SiteConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_category_key_rejected_via_load_config() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r#"
[[routes.categories]]
name = "press"
title = "Press"
slug = "press"
"#,
        )
        .unwrap();

        assert!(load_config(tmp.path()).is_err());
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(SiteConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_zero_page_size() {
        let mut config = SiteConfig::default();
        config.routes.page_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn validate_empty_marker() {
        let mut config = SiteConfig::default();
        config.markdown.field_marker = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_news_is_not_a_media_category() {
        let mut config = SiteConfig::default();
        config.routes.categories.push(CategoryConfig {
            name: "news".into(),
            title: "News".into(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_duplicate_category() {
        let mut config = SiteConfig::default();
        config.routes.categories.push(CategoryConfig {
            name: "blog".into(),
            title: "Blog again".into(),
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn validate_bad_date_format() {
        let mut config = SiteConfig::default();
        config.dates.display_format = "%Q".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_tracking_id_characters() {
        let mut config = SiteConfig::default();
        config.analytics.tracking_id = Some("G-ABC_123".into());
        assert!(config.validate().is_ok());
        config.analytics.tracking_id = Some("G-1');alert(1);//".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r#"
[routes]
news_page_size = 0
"#,
        )
        .unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_is_valid_toml() {
        let content = stock_config_toml();
        let _: toml::Value = toml::from_str(content).expect("stock config must be valid TOML");
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, SiteConfig::default());
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value();
        for section in [
            "markdown",
            "slugs",
            "routes",
            "dates",
            "robots",
            "analytics",
            "processing",
        ] {
            assert!(val.get(section).is_some(), "missing section {section}");
        }
    }
}
