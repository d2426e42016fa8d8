//! Content digests and build-to-build change detection.
//!
//! Every node carries a content digest: a SHA-256 hex string of the bytes it
//! was built from. Digests are **content-addressed**, so identical content
//! always yields an identical digest and re-synthesizing a node from unchanged
//! input is idempotent.
//!
//! # Change detection
//!
//! After each build the digest of every node is persisted to
//! `<cache_dir>/.node-digests.json`. The next build compares its fresh graph
//! against that file and reports how many nodes are unchanged, changed, new
//! or gone. The comparison is keyed by node id; since ids are derived from
//! file paths and key paths, a renamed file shows up as one removal plus one
//! addition.
//!
//! ## Storage
//!
//! The manifest is versioned. A missing file, unparseable JSON or a version
//! mismatch all load as an empty manifest, which simply reports every node as
//! new. Pass `--no-cache` to `build` to start from an empty manifest.

use crate::graph::{NodeGraph, NodeId};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the digest manifest file within the cache directory.
const MANIFEST_FILENAME: &str = ".node-digests.json";

/// Version of the digest manifest format. Bump this to discard all
/// existing manifests when the format or digest computation changes.
const MANIFEST_VERSION: u32 = 1;

/// Computes stable content digests.
pub trait Digester: Sync {
    fn digest(&self, content: &[u8]) -> String;
}

/// SHA-256 hex digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digester;

impl Digester for Sha256Digester {
    fn digest(&self, content: &[u8]) -> String {
        content_digest(content)
    }
}

/// SHA-256 hash of `content`, returned as a hex string.
pub fn content_digest(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// On-disk map of node id → content digest from the previous build.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DigestManifest {
    pub version: u32,
    pub entries: BTreeMap<String, String>,
}

impl DigestManifest {
    /// Create an empty manifest (used for `--no-cache` or the first build).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Snapshot the digests of every node in `graph`.
    pub fn from_graph(graph: &NodeGraph) -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: graph
                .iter()
                .map(|n| (n.id.to_string(), n.content_digest.clone()))
                .collect(),
        }
    }

    /// Load from the cache directory. Returns an empty manifest if the
    /// file doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(cache_dir: &Path) -> Self {
        let content = match std::fs::read_to_string(manifest_path(cache_dir)) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = %e, "Discarding unreadable digest manifest");
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            return Self::empty();
        }
        manifest
    }

    /// Save to the cache directory, creating it if needed.
    pub fn save(&self, cache_dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(cache_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(manifest_path(cache_dir), json)
    }

    /// Compare a freshly built graph against this (previous) manifest.
    pub fn compare(&self, graph: &NodeGraph) -> DigestStats {
        let mut stats = DigestStats::default();
        for node in graph.iter() {
            match self.entries.get(node.id.as_str()) {
                Some(previous) if *previous == node.content_digest => stats.unchanged += 1,
                Some(_) => stats.changed += 1,
                None => stats.added += 1,
            }
        }
        stats.removed = self
            .entries
            .keys()
            .filter(|id| !graph.contains(&NodeId::new(id.as_str())))
            .count() as u32;
        stats
    }
}

/// Summary of node changes between two builds.
#[derive(Debug, Default, PartialEq)]
pub struct DigestStats {
    pub unchanged: u32,
    pub changed: u32,
    pub added: u32,
    pub removed: u32,
}

impl DigestStats {
    pub fn total(&self) -> u32 {
        self.unchanged + self.changed + self.added
    }
}

impl fmt::Display for DigestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unchanged == 0 && self.changed == 0 && self.removed == 0 {
            return write!(f, "{} new", self.added);
        }
        write!(
            f,
            "{} unchanged, {} changed, {} new",
            self.unchanged, self.changed, self.added
        )?;
        if self.removed > 0 {
            write!(f, ", {} removed", self.removed)?;
        }
        write!(f, " ({} total)", self.total())
    }
}

/// Resolve the digest manifest path for a cache directory.
pub fn manifest_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(MANIFEST_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ContentNode, FILE_TYPE};
    use std::fs;
    use tempfile::TempDir;

    fn graph_with(entries: &[(&str, &str)]) -> NodeGraph {
        let mut graph = NodeGraph::new();
        for (id, digest) in entries {
            graph
                .create_node(ContentNode::new(
                    NodeId::new(*id),
                    FILE_TYPE,
                    Default::default(),
                    digest.to_string(),
                ))
                .unwrap();
        }
        graph
    }

    #[test]
    fn content_digest_is_sha256_hex() {
        let d = content_digest(b"hello world");
        assert_eq!(d.len(), 64);
        assert_eq!(
            d,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn content_digest_deterministic_and_content_sensitive() {
        assert_eq!(content_digest(b"same"), content_digest(b"same"));
        assert_ne!(content_digest(b"one"), content_digest(b"two"));
    }

    #[test]
    fn sha256_digester_matches_free_function() {
        assert_eq!(Sha256Digester.digest(b"x"), content_digest(b"x"));
    }

    #[test]
    fn compare_classifies_nodes() {
        let previous = DigestManifest::from_graph(&graph_with(&[
            ("same", "d1"),
            ("edited", "d2"),
            ("deleted", "d3"),
        ]));
        let current = graph_with(&[("same", "d1"), ("edited", "d2-new"), ("fresh", "d4")]);

        let stats = previous.compare(&current);
        assert_eq!(
            stats,
            DigestStats {
                unchanged: 1,
                changed: 1,
                added: 1,
                removed: 1,
            }
        );
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let m = DigestManifest::from_graph(&graph_with(&[("a", "1"), ("b", "2")]));
        m.save(tmp.path()).unwrap();

        let loaded = DigestManifest::load(tmp.path());
        assert_eq!(loaded.version, MANIFEST_VERSION);
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries["b"], "2");
    }

    #[test]
    fn save_creates_cache_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/cache");
        DigestManifest::empty().save(&dir).unwrap();
        assert!(manifest_path(&dir).exists());
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(DigestManifest::load(tmp.path()).entries.is_empty());
    }

    #[test]
    fn load_corrupt_json_returns_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(manifest_path(tmp.path()), "not json").unwrap();
        assert!(DigestManifest::load(tmp.path()).entries.is_empty());
    }

    #[test]
    fn load_wrong_version_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let json = format!(
            r#"{{"version": {}, "entries": {{"a": "h"}}}}"#,
            MANIFEST_VERSION + 1
        );
        fs::write(manifest_path(tmp.path()), json).unwrap();
        assert!(DigestManifest::load(tmp.path()).entries.is_empty());
    }

    #[test]
    fn stats_display_first_build() {
        let s = DigestStats {
            added: 4,
            ..Default::default()
        };
        assert_eq!(s.to_string(), "4 new");
    }

    #[test]
    fn stats_display_incremental() {
        let s = DigestStats {
            unchanged: 5,
            changed: 1,
            added: 2,
            removed: 0,
        };
        assert_eq!(s.to_string(), "5 unchanged, 1 changed, 2 new (8 total)");
    }

    #[test]
    fn stats_display_with_removals() {
        let s = DigestStats {
            unchanged: 1,
            changed: 0,
            added: 0,
            removed: 3,
        };
        assert_eq!(s.to_string(), "1 unchanged, 0 changed, 0 new, 3 removed (1 total)");
    }
}
