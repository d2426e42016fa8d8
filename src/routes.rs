//! Route synthesis.
//!
//! Runs after the node pass has settled and turns the final graph into page
//! routes, in three phases:
//!
//! ```text
//! A. static pages   every pages record with a link   → static-page
//! B. media          per configured category:
//!                     paginated listing              → media-listing
//!                     one page per local item        → media-item
//! C. news           paginated listing                → news-listing
//! ```
//!
//! ## Pagination
//!
//! `N` items with page size `P` give `ceil(N / P)` listing pages. Page 0 lives
//! at the base path, page `k > 0` at `{base}/{k + 1}`:
//!
//! ```text
//! /media/blog      items  0..10
//! /media/blog/2    items 10..20
//! ```
//!
//! No items means no listing pages at all.
//!
//! ## Failures
//!
//! A failed query for static pages or news aborts the build. A failed query
//! for one media category is logged and only that category is skipped.

use crate::config::{NEWS_CATEGORY, SiteConfig};
use crate::graph::{ContentNode, MARKDOWN_TYPE};
use crate::pipeline::{PageRegistry, Plugin};
use crate::query::{GraphQuery, ID_FIELD, Order, Query, QueryError};
use crate::schema::{FieldType, Schema};
use crate::slug::SLUG_FIELD;
use crate::types::{RouteDescriptor, Template};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("Static page query failed: {0}")]
    StaticPages(QueryError),
    #[error("News query failed: {0}")]
    News(QueryError),
}

/// One listing page: 0-based index plus its slice of the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub index: usize,
    pub skip: usize,
    pub limit: usize,
    pub num_pages: usize,
}

impl PageWindow {
    /// 1-based page number shown to readers.
    pub fn current_page(&self) -> usize {
        self.index + 1
    }
}

/// Split `total` items into pages of `page_size`.
pub fn paginate(total: usize, page_size: usize) -> Vec<PageWindow> {
    if page_size == 0 {
        return Vec::new();
    }
    let num_pages = total.div_ceil(page_size);
    (0..num_pages)
        .map(|index| PageWindow {
            index,
            skip: index * page_size,
            limit: page_size,
            num_pages,
        })
        .collect()
}

/// URL of listing page `index` under `base`.
pub fn page_path(base: &str, index: usize) -> String {
    if index == 0 {
        base.to_string()
    } else {
        format!("{base}/{}", index + 1)
    }
}

/// A paginated listing to emit.
struct Listing<'a> {
    category: &'a str,
    title: &'a str,
    base: String,
    page_size: usize,
    template: Template,
}

impl Listing<'_> {
    /// Registers every listing page and returns their paths.
    fn register(&self, total: usize, pages: &mut dyn PageRegistry) -> Vec<String> {
        let mut paths = Vec::new();
        for window in paginate(total, self.page_size) {
            let path = page_path(&self.base, window.index);
            let context = json!({
                "limit": window.limit,
                "skip": window.skip,
                "category": self.category,
                "title": self.title,
                "numPages": window.num_pages,
                "currentPage": window.current_page(),
                "basePath": self.base,
                "canonical": path,
            });
            paths.push(path.clone());
            pages.register(RouteDescriptor::new(path, self.template, context));
        }
        paths
    }
}

fn category_base(config: &SiteConfig, category: &str) -> String {
    format!("{}/{category}", config.routes.base_path.trim_end_matches('/'))
}

/// Media items of one category, newest first.
fn category_query(config: &SiteConfig, category: &str) -> Query {
    Query::new(MARKDOWN_TYPE)
        .filter_eq(config.routes.category_field.as_str(), category)
        .sort_by(config.routes.date_field.as_str(), Order::Desc)
}

fn links_out(item: &ContentNode, config: &SiteConfig) -> bool {
    match item.get_path(&config.routes.external_link_field) {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// Phase A: one route per linked page record.
pub fn create_static_pages(
    query: &dyn GraphQuery,
    pages: &mut dyn PageRegistry,
    config: &SiteConfig,
) -> Result<(), RouteError> {
    let records = query
        .run(&Query::new(config.routes.pages_type.as_str()).sort_by(ID_FIELD, Order::Asc))
        .map_err(|e| {
            tracing::error!(node_type = %config.routes.pages_type, error = %e, "Static page query failed");
            RouteError::StaticPages(e)
        })?;

    for record in records {
        let Some(link) = record.get_str(&config.routes.page_link_field) else {
            tracing::warn!(node = %record.id, "Page record has no link, skipping");
            continue;
        };
        let context = json!({"id": record.id, "link": link});
        pages.register(RouteDescriptor::new(link, Template::StaticPage, context));
    }
    Ok(())
}

/// Phase B: listing and item pages for each media category.
///
/// Item paths must not collide with a listing page or with an earlier
/// (newer) item of the same category; a colliding item is logged and gets
/// no page. Returns the categories skipped because their query failed.
pub fn create_media_pages(
    query: &dyn GraphQuery,
    pages: &mut dyn PageRegistry,
    config: &SiteConfig,
) -> Vec<String> {
    let mut skipped = Vec::new();
    for category in &config.routes.categories {
        let items = match query.run(&category_query(config, &category.name)) {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(category = %category.name, error = %e, "Media query failed, skipping category");
                skipped.push(category.name.clone());
                continue;
            }
        };

        let listing = Listing {
            category: &category.name,
            title: &category.title,
            base: category_base(config, &category.name),
            page_size: config.routes.page_size,
            template: Template::MediaListing,
        };
        let mut claimed: BTreeMap<String, String> = listing
            .register(items.len(), pages)
            .into_iter()
            .map(|path| (path, "listing".to_string()))
            .collect();

        for item in &items {
            if links_out(item, config) {
                continue;
            }
            let Some(slug) = item.field_str(SLUG_FIELD) else {
                tracing::warn!(node = %item.id, category = %category.name, "Media item has no slug, skipping");
                continue;
            };
            let path = format!("{}/{slug}", listing.base);
            if let Some(owner) = claimed.get(&path) {
                tracing::warn!(
                    node = %item.id,
                    taken_by = %owner,
                    path = %path,
                    "Route path already taken, skipping media item"
                );
                continue;
            }
            claimed.insert(path.clone(), item.id.to_string());
            let context = json!({"id": item.id, "slug": slug, "category": category.name});
            pages.register(RouteDescriptor::new(path, Template::MediaItem, context));
        }
    }
    skipped
}

/// Phase C: the paginated news listing.
pub fn create_news_pages(
    query: &dyn GraphQuery,
    pages: &mut dyn PageRegistry,
    config: &SiteConfig,
) -> Result<(), RouteError> {
    let items = query
        .run(&category_query(config, NEWS_CATEGORY))
        .map_err(|e| {
            tracing::error!(error = %e, "News query failed");
            RouteError::News(e)
        })?;
    Listing {
        category: NEWS_CATEGORY,
        title: &config.routes.news_title,
        base: category_base(config, NEWS_CATEGORY),
        page_size: config.routes.news_page_size,
        template: Template::NewsListing,
    }
    .register(items.len(), pages);
    Ok(())
}

/// All three phases in order.
pub fn create_routes(
    query: &dyn GraphQuery,
    pages: &mut dyn PageRegistry,
    config: &SiteConfig,
) -> Result<(), RouteError> {
    create_static_pages(query, pages, config)?;
    let skipped = create_media_pages(query, pages, config);
    if !skipped.is_empty() {
        tracing::warn!(categories = ?skipped, "Some media categories were skipped");
    }
    create_news_pages(query, pages, config)
}

/// Declares the fields route queries use and emits routes after the pass.
pub struct RoutesPlugin;

impl Plugin for RoutesPlugin {
    fn name(&self) -> &'static str {
        "routes"
    }

    fn customize_schema(&self, schema: &mut Schema, config: &SiteConfig) {
        let routes = &config.routes;
        schema
            .define(MARKDOWN_TYPE)
            .field(&routes.category_field, FieldType::String)
            .field(&routes.date_field, FieldType::Date)
            .field(&routes.external_link_field, FieldType::String)
            .field(&format!("fields.{SLUG_FIELD}"), FieldType::String);
        schema
            .define(&routes.pages_type)
            .field(&routes.page_link_field, FieldType::String)
            .field(&format!("fields.{SLUG_FIELD}"), FieldType::String);
    }

    fn create_pages(
        &self,
        query: &dyn GraphQuery,
        pages: &mut dyn PageRegistry,
        config: &SiteConfig,
    ) -> Result<(), RouteError> {
        create_routes(query, pages, config)
    }
}
