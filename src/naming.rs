//! Centralized file name parsing.
//!
//! Node payloads, slugs and JSON record type names are all derived from a
//! content file's relative path. Keeping the rules in one place guarantees the
//! scanner and the plugins agree on them:
//!
//! - `blog/hello-world.md` → name `hello-world`, extension `md`, directory `blog`
//! - `pages/about.json` (an object) → type `PagesJson`
//! - `team-members.json` (an array) → type `TeamMembersJson`

use std::path::Path;

/// Parts of a content file's relative path.
#[derive(Debug, Clone, PartialEq)]
pub struct FileName {
    /// Relative path with `/` separators.
    pub relative_path: String,
    /// Parent directory with `/` separators; empty at the content root.
    pub relative_directory: String,
    /// Base name without extension.
    pub name: String,
    /// Lower-cased extension without the dot; empty if none.
    pub extension: String,
}

/// Split a path relative to the content root.
pub fn parse_file_name(relative: &Path) -> FileName {
    let components: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let relative_path = components.join("/");
    let relative_directory = match components.split_last() {
        Some((_, dirs)) => dirs.join("/"),
        None => String::new(),
    };
    let name = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = relative
        .extension()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    FileName {
        relative_path,
        relative_directory,
        name,
        extension,
    }
}

/// `team-members` → `TeamMembers`, `press_kit` → `PressKit`.
///
/// Any non-alphanumeric character starts a new word.
pub fn pascal_case(input: &str) -> String {
    input
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Node type of records loaded from a JSON file.
///
/// Object files are typed after their directory (`pages/about.json` →
/// `PagesJson`); array files after the file itself (`team.json` →
/// `TeamJson`). An object file at the content root falls back to its own
/// name.
pub fn json_type_name(file: &FileName, is_array: bool) -> String {
    let base = if is_array || file.relative_directory.is_empty() {
        file.name.as_str()
    } else {
        file.relative_directory
            .rsplit('/')
            .next()
            .unwrap_or(file.relative_directory.as_str())
    };
    format!("{}Json", pascal_case(base))
}
