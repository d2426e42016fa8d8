//! Content date parsing and display formatting.
//!
//! Frontmatter and JSON records carry dates as strings in a handful of
//! shapes. They are parsed into a naive UTC timestamp so listings can sort
//! on real dates instead of on string order, and formatted for display with
//! the `strftime`-style pattern from `[dates] display_format`.
//!
//! Accepted inputs:
//!
//! ```text
//! 2024-06-15T14:30:45Z          RFC 3339 (offsets are converted to UTC)
//! 2024-06-15T14:30:45+02:00
//! 2024-06-15T14:30:45           no offset, taken as UTC
//! 2024-06-15 14:30[:45]
//! 2024-06-15
//! ```

use crate::graph::{Actions, ContentNode};
use crate::pipeline::{NodeContext, Plugin};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::fmt::Write;

/// Name of the attached display date field.
pub const DISPLAY_FIELD: &str = "date_display";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a content date string.
pub fn parse_date(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.naive_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// [`parse_date`] for JSON values; only strings can hold dates.
pub fn parse_date_value(value: &Value) -> Option<NaiveDateTime> {
    value.as_str().and_then(parse_date)
}

/// Format a date with a `strftime`-style pattern.
///
/// Returns `None` when the pattern contains an invalid specifier.
pub fn format_date(date: &NaiveDateTime, pattern: &str) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", date.format(pattern)).ok()?;
    Some(out)
}

/// Attaches a formatted display date to every node whose date field parses.
pub struct DatePlugin;

impl Plugin for DatePlugin {
    fn name(&self) -> &'static str {
        "dates"
    }

    fn on_create_node(&self, node: &ContentNode, ctx: &NodeContext<'_>, actions: &mut Actions) {
        if node.is_file() || node.is_synthesized() {
            return;
        }
        let field = &ctx.config.routes.date_field;
        let Some(raw) = node.get_path(field) else {
            return;
        };
        let Some(date) = parse_date_value(raw) else {
            tracing::warn!(node = %node.id, field = %field, value = %raw, "Unparseable date");
            return;
        };
        if let Some(display) = format_date(&date, &ctx.config.dates.display_format) {
            actions.add_field(&node.id, DISPLAY_FIELD, display);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn parses_plain_date() {
        let dt = parse_date("2024-06-15").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 6, 15));
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn parses_rfc3339_and_converts_offset() {
        let dt = parse_date("2024-06-15T14:30:45+02:00").unwrap();
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (12, 30, 45));
    }

    #[test]
    fn parses_space_separated_time() {
        let dt = parse_date("2024-06-15 09:05").unwrap();
        assert_eq!((dt.hour(), dt.minute()), (9, 5));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_date("last tuesday").is_none());
        assert!(parse_date("2024-13-40").is_none());
        assert!(parse_date_value(&json!(20240615)).is_none());
    }

    #[test]
    fn later_dates_compare_greater() {
        assert!(parse_date("2024-06-15").unwrap() < parse_date("2024-06-15T00:00:01Z").unwrap());
    }

    #[test]
    fn formats_with_pattern() {
        let dt = parse_date("2024-03-05").unwrap();
        assert_eq!(format_date(&dt, "%B %-d, %Y").as_deref(), Some("March 5, 2024"));
        assert_eq!(format_date(&dt, "%Y/%m/%d").as_deref(), Some("2024/03/05"));
    }

    #[test]
    fn invalid_pattern_formats_to_none() {
        let dt = parse_date("2024-03-05").unwrap();
        assert_eq!(format_date(&dt, "%Q"), None);
    }
}
