//! `robots.txt` per deployment context.
//!
//! Only the production context may be crawled. Previews, branch deploys and
//! any other context get a blanket disallow so search engines never index
//! unfinished content.
//!
//! ```text
//! production                          anything else
//! ----------                          -------------
//! User-agent: *                       User-agent: *
//! Allow: /                            Disallow: /
//!
//! Host: https://www.example.org
//! Sitemap: https://www.example.org/sitemap.xml
//! ```

use crate::config::RobotsConfig;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RobotsError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Whether `context` is the crawlable one.
pub fn is_crawlable(config: &RobotsConfig, context: &str) -> bool {
    context == config.production_context
}

/// Absolute sitemap URL, if one can be formed.
fn sitemap_url(config: &RobotsConfig) -> Option<String> {
    if config.sitemap.contains("://") {
        return Some(config.sitemap.clone());
    }
    let host = config.host.as_deref()?;
    Some(format!(
        "{}/{}",
        host.trim_end_matches('/'),
        config.sitemap.trim_start_matches('/')
    ))
}

/// Render `robots.txt` for a deployment context.
pub fn render_robots(config: &RobotsConfig, context: &str) -> String {
    if !is_crawlable(config, context) {
        return "User-agent: *\nDisallow: /\n".to_string();
    }
    let mut out = String::from("User-agent: *\nAllow: /\n");
    let host = config.host.as_deref();
    let sitemap = sitemap_url(config);
    if host.is_some() || sitemap.is_some() {
        out.push('\n');
    }
    if let Some(host) = host {
        out.push_str(&format!("Host: {host}\n"));
    }
    match sitemap {
        Some(url) => out.push_str(&format!("Sitemap: {url}\n")),
        None => tracing::warn!("No robots.host configured, omitting Sitemap line"),
    }
    out
}

/// Write `robots.txt` into `output_dir`, creating it if needed.
pub fn write_robots(
    output_dir: &Path,
    config: &RobotsConfig,
    context: &str,
) -> Result<PathBuf, RobotsError> {
    let path = output_dir.join("robots.txt");
    fs::create_dir_all(output_dir)
        .and_then(|_| fs::write(&path, render_robots(config, context)))
        .map_err(|source| RobotsError::Io {
            path: path.clone(),
            source,
        })?;
    tracing::debug!(path = %path.display(), context, "Wrote robots.txt");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn with_host() -> RobotsConfig {
        RobotsConfig {
            host: Some("https://www.example.org/".into()),
            ..Default::default()
        }
    }

    #[test]
    fn production_allows_and_advertises() {
        assert_eq!(
            render_robots(&with_host(), "production"),
            "User-agent: *\nAllow: /\n\nHost: https://www.example.org/\nSitemap: https://www.example.org/sitemap.xml\n"
        );
    }

    #[test]
    fn other_contexts_disallow_everything() {
        for context in ["deploy-preview", "branch-deploy", "dev", ""] {
            assert_eq!(
                render_robots(&with_host(), context),
                "User-agent: *\nDisallow: /\n"
            );
        }
    }

    #[test]
    fn production_without_host_omits_sitemap() {
        assert_eq!(
            render_robots(&RobotsConfig::default(), "production"),
            "User-agent: *\nAllow: /\n"
        );
    }

    #[test]
    fn absolute_sitemap_is_kept() {
        let config = RobotsConfig {
            sitemap: "https://cdn.example.org/sitemap-index.xml".into(),
            ..Default::default()
        };
        assert!(
            render_robots(&config, "production")
                .ends_with("\n\nSitemap: https://cdn.example.org/sitemap-index.xml\n")
        );
    }

    #[test]
    fn custom_production_context() {
        let config = RobotsConfig {
            production_context: "live".into(),
            ..Default::default()
        };
        assert!(render_robots(&config, "live").contains("Allow: /"));
        assert!(render_robots(&config, "production").contains("Disallow: /"));
    }

    #[test]
    fn write_creates_output_dir() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("public");
        let path = write_robots(&out, &with_host(), "deploy-preview").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "User-agent: *\nDisallow: /\n");
    }
}
