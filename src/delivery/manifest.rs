//! Legacy digital-goods manifest
//!
//! When no directory/archive catalog is configured, deliverables come from a
//! manifest mapping entity ids to one or more file paths relative to the
//! goods dir. The goods dir also holds custom product uploads, which must
//! never be served without a redeemed token. Every relative path crossing
//! this boundary is validated against traversal before any filesystem
//! access.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::types::{Result, ShopError};

/// One manifest value: a single path or a list of paths
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ManifestEntry {
    One(String),
    Many(Vec<String>),
}

impl ManifestEntry {
    fn paths(&self) -> Vec<&str> {
        match self {
            ManifestEntry::One(path) => vec![path.as_str()],
            ManifestEntry::Many(paths) => paths.iter().map(String::as_str).collect(),
        }
    }
}

/// The protected goods directory and its manifest
pub struct DigitalGoods {
    goods_dir: PathBuf,
}

impl DigitalGoods {
    pub fn new(goods_dir: PathBuf) -> Self {
        Self { goods_dir }
    }

    pub fn goods_dir(&self) -> &Path {
        &self.goods_dir
    }

    /// Load the manifest, failing open to an empty map
    fn load_manifest(&self) -> HashMap<String, ManifestEntry> {
        let path = self.goods_dir.join("manifest.json");
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(_) => return HashMap::new(),
        };
        match serde_json::from_reader(file) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(error = %err, "Unreadable digital goods manifest, treating as empty");
                HashMap::new()
            }
        }
    }

    /// Resolve the manifest files for a set of purchased ids, in order and
    /// de-duplicated. Ids without their own entry fall back to the
    /// manifest's `default` entry when one exists.
    pub fn resolve_files(&self, product_ids: &[String]) -> Vec<String> {
        let manifest = self.load_manifest();
        let default = manifest.get("default");

        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for pid in product_ids {
            let entry = match manifest.get(pid).or(default) {
                Some(entry) => entry,
                None => continue,
            };
            for path in entry.paths() {
                let path = path.trim();
                if !path.is_empty() && seen.insert(path.to_string()) {
                    files.push(path.to_string());
                }
            }
        }
        files
    }

    /// The whole-order bundle file, when the manifest names one
    pub fn bundle_file(&self) -> Option<String> {
        match self.load_manifest().get("bundle")? {
            ManifestEntry::One(path) if !path.trim().is_empty() => Some(path.trim().to_string()),
            _ => None,
        }
    }

    /// Join a relative path under the goods dir, rejecting traversal before
    /// touching the filesystem
    pub fn safe_path(&self, relpath: &str) -> Result<PathBuf> {
        let rel = relpath.replace('\\', "/");
        let rel = rel.trim_start_matches('/');
        if rel.is_empty() {
            return Err(ShopError::InvalidPath);
        }
        if rel.split('/').any(|segment| segment == "..") {
            return Err(ShopError::InvalidPath);
        }
        Ok(self.goods_dir.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goods_with_manifest(manifest: &str) -> (tempfile::TempDir, DigitalGoods) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("manifest.json"), manifest).unwrap();
        let goods = DigitalGoods::new(tmp.path().to_path_buf());
        (tmp, goods)
    }

    #[test]
    fn test_resolve_files_with_default_fallback() {
        let (_tmp, goods) = goods_with_manifest(
            r#"{
                "default": "00 wszystkie produkty.zip",
                "06L8k": "LAMINACJA BRWI - dokumenty.zip",
                "double": ["a.pdf", "b.pdf", "a.pdf"]
            }"#,
        );

        let files = goods.resolve_files(&["06L8k".into(), "unknown".into(), "double".into()]);
        assert_eq!(
            files,
            vec!["LAMINACJA BRWI - dokumenty.zip", "00 wszystkie produkty.zip", "a.pdf", "b.pdf"]
        );
    }

    #[test]
    fn test_resolve_files_without_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let goods = DigitalGoods::new(tmp.path().to_path_buf());
        assert!(goods.resolve_files(&["x".into()]).is_empty());
    }

    #[test]
    fn test_bundle_file() {
        let (_tmp, goods) = goods_with_manifest(r#"{"bundle": "00 produkty.zip"}"#);
        assert_eq!(goods.bundle_file().as_deref(), Some("00 produkty.zip"));

        let (_tmp2, goods2) = goods_with_manifest(r#"{"bundle": "  "}"#);
        assert!(goods2.bundle_file().is_none());
    }

    #[test]
    fn test_safe_path_accepts_nested_relative() {
        let tmp = tempfile::tempdir().unwrap();
        let goods = DigitalGoods::new(tmp.path().to_path_buf());
        let path = goods.safe_path("custom_uploads/voucher.pdf").unwrap();
        assert!(path.starts_with(tmp.path()));
    }

    #[test]
    fn test_safe_path_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let goods = DigitalGoods::new(tmp.path().to_path_buf());
        for attempt in [
            "../../etc/passwd",
            "a/../../etc/passwd",
            "..\\..\\windows\\system32",
            "/../../x",
            "",
        ] {
            assert!(
                matches!(goods.safe_path(attempt), Err(ShopError::InvalidPath)),
                "accepted {:?}",
                attempt
            );
        }
    }
}
