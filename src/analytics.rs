//! Analytics snippet injection.
//!
//! Rendered pages get the tracking snippet inserted right before `</head>`,
//! but only when a tracking id is configured and the deployment context is
//! listed in `[analytics] contexts`. Previews stay out of the statistics.
//!
//! Injection is idempotent: the snippet carries a marker attribute and pages
//! that already contain it are left alone, so `inject` can run twice over the
//! same output directory.

use crate::config::AnalyticsConfig;
use maud::{Markup, PreEscaped, html};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Attribute identifying an injected snippet.
const MARKER: &str = "data-analytics=\"sitegraph\"";

#[derive(Error, Debug)]
pub enum InjectError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// What happened to one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    Injected(String),
    AlreadyPresent,
    NoHead,
}

/// Tally over an output directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InjectStats {
    pub injected: usize,
    pub already_present: usize,
    pub no_head: usize,
}

impl std::fmt::Display for InjectStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} injected", self.injected)?;
        if self.already_present > 0 {
            write!(f, ", {} already present", self.already_present)?;
        }
        if self.no_head > 0 {
            write!(f, ", {} without <head>", self.no_head)?;
        }
        Ok(())
    }
}

/// The tracking id to inject for `context`, if analytics is enabled there.
pub fn enabled_tracking_id<'a>(config: &'a AnalyticsConfig, context: &str) -> Option<&'a str> {
    let id = config.tracking_id.as_deref()?;
    config.contexts.iter().any(|c| c == context).then_some(id)
}

/// The gtag snippet for `tracking_id`.
///
/// The id is interpolated into inline JavaScript unescaped; config
/// validation restricts it to ASCII alphanumerics, `-` and `_`.
pub fn snippet(tracking_id: &str) -> Markup {
    let loader = format!("https://www.googletagmanager.com/gtag/js?id={tracking_id}");
    let init = format!(
        "window.dataLayer=window.dataLayer||[];function gtag(){{dataLayer.push(arguments);}}gtag('js',new Date());gtag('config','{tracking_id}');"
    );
    html! {
        script async src=(loader) data-analytics="sitegraph" {}
        script data-analytics="sitegraph" { (PreEscaped(init)) }
    }
}

/// Insert the snippet before the first `</head>` (case-insensitive).
pub fn inject_html(html: &str, tracking_id: &str) -> Injection {
    if html.contains(MARKER) {
        return Injection::AlreadyPresent;
    }
    let Some(pos) = html.to_ascii_lowercase().find("</head>") else {
        return Injection::NoHead;
    };
    let snippet = snippet(tracking_id).into_string();
    let mut out = String::with_capacity(html.len() + snippet.len());
    out.push_str(&html[..pos]);
    out.push_str(&snippet);
    out.push_str(&html[pos..]);
    Injection::Injected(out)
}

/// Inject into every `.html` file under `output_dir`.
///
/// Returns `None` without touching anything when analytics is disabled for
/// `context`.
pub fn inject_dir(
    output_dir: &Path,
    config: &AnalyticsConfig,
    context: &str,
) -> Result<Option<InjectStats>, InjectError> {
    let Some(tracking_id) = enabled_tracking_id(config, context) else {
        tracing::info!(context, "Analytics disabled for this context");
        return Ok(None);
    };

    let mut stats = InjectStats::default();
    for entry in WalkDir::new(output_dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let is_html = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html"));
        if !entry.file_type().is_file() || !is_html {
            continue;
        }
        let io_err = |source| InjectError::Io {
            path: path.to_path_buf(),
            source,
        };
        let html = fs::read_to_string(path).map_err(io_err)?;
        match inject_html(&html, tracking_id) {
            Injection::Injected(updated) => {
                fs::write(path, updated).map_err(io_err)?;
                stats.injected += 1;
            }
            Injection::AlreadyPresent => stats.already_present += 1,
            Injection::NoHead => {
                tracing::warn!(path = %path.display(), "No </head> in page, skipping");
                stats.no_head += 1;
            }
        }
    }
    Ok(Some(stats))
}
