//! Filesystem catalog scanner
//!
//! Walks the products root: every immediate child that is a directory or a
//! `.zip` file becomes a category. Members are listed uniformly whether the
//! category is backed by a directory or an archive. All scan errors are
//! non-fatal and degrade to an empty listing so one unreadable category never
//! breaks the rest of the catalog.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::catalog::slug::{base_name, extension, member_id, slugify};
use crate::types::PLACEHOLDER_CARD;

/// Backing store of a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    Dir,
    Zip,
}

/// A top-level grouping in the source catalog
#[derive(Debug, Clone)]
pub struct Category {
    pub slug: String,
    /// Base name on disk (directory name or zip file stem)
    pub name: String,
    pub display_name: String,
    pub price_from: Option<f64>,
    pub short_desc: String,
    pub kind: CategoryKind,
    pub source_path: PathBuf,
    /// Card image path relative to the static dir
    pub card_image: String,
}

/// A single file inside a category
#[derive(Debug, Clone)]
pub struct Member {
    /// Separator-normalized path shown to customers
    pub display: String,
    /// Relative path (zip entry name for archive categories), kept verbatim
    /// for exact-match extraction
    pub rel: String,
    /// Absolute path; only set for directory-backed categories
    pub abs: Option<PathBuf>,
    pub id: String,
    pub ext: String,
}

/// Presentation metadata for a category, keyed by slug in
/// `category_meta.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price_from: Option<f64>,
    #[serde(default)]
    pub short_desc: String,
}

/// Scans the products root and lists category members
pub struct CatalogScanner {
    products_root: PathBuf,
    static_dir: PathBuf,
    meta_path: PathBuf,
}

impl CatalogScanner {
    pub fn new(products_root: PathBuf, static_dir: PathBuf, meta_path: PathBuf) -> Self {
        Self {
            products_root,
            static_dir,
            meta_path,
        }
    }

    /// Load category metadata, failing open to an empty map
    pub fn load_meta(&self) -> HashMap<String, CategoryMeta> {
        match File::open(&self.meta_path) {
            Ok(file) => match serde_json::from_reader(file) {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(error = %err, "Unreadable category metadata, continuing without");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        }
    }

    /// Scan the products root and return all categories, sorted by display
    /// name. A missing or unreadable root yields an empty catalog.
    pub fn scan(&self) -> Vec<Category> {
        let meta = self.load_meta();
        let entries = match std::fs::read_dir(&self.products_root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "Products root not readable, catalog is empty");
                return Vec::new();
            }
        };

        let mut cats = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.is_empty() || name.starts_with('.') {
                continue;
            }
            let full = entry.path();

            let (kind, base) = if full.is_dir() {
                (CategoryKind::Dir, name.clone())
            } else if full.is_file() && name.to_lowercase().ends_with(".zip") {
                let stem = Path::new(&name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| name.clone());
                (CategoryKind::Zip, stem)
            } else {
                continue;
            };

            let slug = slugify(&base);
            let meta = meta.get(&slug).cloned().unwrap_or_default();
            let display_name = if meta.name.trim().is_empty() {
                base.clone()
            } else {
                meta.name.trim().to_string()
            };

            let card_rel = format!("cards/{}.png", slug);
            let card_image = if self.static_dir.join(&card_rel).exists() {
                card_rel
            } else {
                PLACEHOLDER_CARD.to_string()
            };

            cats.push(Category {
                slug,
                name: base,
                display_name,
                price_from: meta.price_from,
                short_desc: meta.short_desc.trim().to_string(),
                kind,
                source_path: full,
                card_image,
            });
        }

        cats.sort_by_key(|c| c.display_name.to_lowercase());
        debug!(categories = cats.len(), "Catalog scan complete");
        cats
    }

    /// Find a scanned category by slug (first scan order wins on collisions)
    pub fn category(&self, slug: &str) -> Option<Category> {
        self.scan().into_iter().find(|c| c.slug == slug)
    }

    /// List the members of a category, sorted by display path
    pub fn members(&self, cat: &Category) -> Vec<Member> {
        let mut members = match cat.kind {
            CategoryKind::Dir => self.dir_members(cat),
            CategoryKind::Zip => self.zip_members(cat),
        };
        members.sort_by_key(|m| m.display.to_lowercase());
        members
    }

    /// Find a member by its stable id
    pub fn member_by_id(&self, cat: &Category, id: &str) -> Option<Member> {
        self.members(cat).into_iter().find(|m| m.id == id)
    }

    fn dir_members(&self, cat: &Category) -> Vec<Member> {
        let root = &cat.source_path;
        if !root.is_dir() {
            return Vec::new();
        }

        let mut members = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            if rel.is_empty() {
                continue;
            }
            members.push(Member {
                display: rel.clone(),
                id: member_id(&rel),
                ext: extension(base_name(&rel)),
                abs: Some(entry.path().to_path_buf()),
                rel,
            });
        }
        members
    }

    fn zip_members(&self, cat: &Category) -> Vec<Member> {
        let file = match File::open(&cat.source_path) {
            Ok(file) => file,
            Err(err) => {
                warn!(category = %cat.slug, error = %err, "Archive not readable, skipping");
                return Vec::new();
            }
        };
        let mut archive = match zip::ZipArchive::new(file) {
            Ok(archive) => archive,
            Err(err) => {
                warn!(category = %cat.slug, error = %err, "Archive not listable, skipping");
                return Vec::new();
            }
        };

        let mut members = Vec::new();
        for index in 0..archive.len() {
            let entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if !entry.is_file() {
                continue;
            }
            let raw = entry.name().to_string();
            let display = raw.replace('\\', "/");
            if display.starts_with("__MACOSX/") || display.to_lowercase().ends_with(".ds_store") {
                continue;
            }
            members.push(Member {
                id: member_id(&raw),
                ext: extension(base_name(&display)),
                display,
                rel: raw,
                abs: None,
            });
        }
        members
    }
}
