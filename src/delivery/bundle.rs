//! Bundle and extraction cache
//!
//! Turns a category into a deliverable filesystem artifact: a zip bundle for
//! directory-backed categories, or a single extracted file for archive
//! members. Artifacts are memoized under the cache dir keyed by a truncated
//! SHA-256 fingerprint of the source path and its mtime, so repeated
//! downloads skip recomputation entirely.
//!
//! Builds go through a temp file in the destination directory and an atomic
//! rename, so a concurrent reader never sees a partial artifact. Two
//! concurrent builders for the same key produce byte-identical output and the
//! last rename wins; the per-destination lock only avoids the duplicate work.
//! Stale artifacts from older mtimes are left behind on purpose.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::catalog::scanner::{Category, CategoryKind, Member};
use crate::catalog::slug::{base_name, extension, slugify};
use crate::types::{Result, ShopError};

/// Filesystem-backed artifact cache
pub struct ArtifactCache {
    cache_dir: PathBuf,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl ArtifactCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Produce (or reuse) the zip bundle for a directory-backed category
    pub fn bundle_for_directory(&self, cat: &Category) -> Result<PathBuf> {
        if cat.kind != CategoryKind::Dir || !cat.source_path.is_dir() {
            return Err(ShopError::NotFound("category source missing".into()));
        }

        let abs_root = cat
            .source_path
            .canonicalize()
            .unwrap_or_else(|_| cat.source_path.clone());
        let key = fingerprint(
            &format!("{}:{}", abs_root.display(), mtime_secs(&abs_root)),
            12,
        );
        let base = self.cache_dir.join("bundles").join(&cat.slug);
        std::fs::create_dir_all(&base)?;
        let out = base.join(format!("{}-{}.zip", cat.slug, key));

        if out.exists() {
            debug!(category = %cat.slug, "Bundle cache hit");
            return Ok(out);
        }

        let lock = self.lock_for(&out);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if out.exists() {
            return Ok(out);
        }

        build_bundle(&cat.source_path, &base, &out)?;
        info!(category = %cat.slug, "Bundle built");
        Ok(out)
    }

    /// Extract (or reuse) a single member from an archive-backed category.
    /// The member's relative path must match an archive entry exactly after
    /// separator normalization.
    pub fn extract_member(&self, cat: &Category, member: &Member) -> Result<PathBuf> {
        if cat.kind != CategoryKind::Zip || !cat.source_path.is_file() {
            return Err(ShopError::NotFound("category archive missing".into()));
        }

        let key = fingerprint(
            &format!(
                "{}|{}|{}",
                cat.source_path.display(),
                mtime_secs(&cat.source_path),
                member.rel
            ),
            16,
        );
        let base = self.cache_dir.join("members").join(&cat.slug);
        std::fs::create_dir_all(&base)?;

        let file_name = base_name(&member.rel);
        let out = base.join(format!("{}-{}{}", slugify(file_name), key, extension(file_name)));

        if out.exists() {
            debug!(category = %cat.slug, member = %member.id, "Extraction cache hit");
            return Ok(out);
        }

        let lock = self.lock_for(&out);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if out.exists() {
            return Ok(out);
        }

        let file = File::open(&cat.source_path)
            .map_err(|_| ShopError::NotFound("category archive missing".into()))?;
        let mut archive = ZipArchive::new(file)?;
        let target = member.rel.replace('\\', "/");

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.name().replace('\\', "/") != target {
                continue;
            }
            let mut tmp = NamedTempFile::new_in(&base)?;
            io::copy(&mut entry, &mut tmp)
                .map_err(|err| ShopError::BuildFailure(err.to_string()))?;
            tmp.persist(&out)
                .map_err(|err| ShopError::BuildFailure(err.to_string()))?;
            info!(category = %cat.slug, member = %member.id, "Member extracted");
            return Ok(out);
        }

        Err(ShopError::NotFound("file not present in archive".into()))
    }
}

/// Write every regular file under `root` into a deflated zip at `out`,
/// entry names relative to `root`, via an atomic rename
fn build_bundle(root: &Path, base: &Path, out: &Path) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(base)?;
    {
        let mut writer = ZipWriter::new(tmp.as_file_mut());
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(root) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            // Entry names must stay inside the bundle root
            if rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
            {
                continue;
            }
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if name.is_empty() {
                continue;
            }

            writer.start_file(name, options)?;
            let mut src = File::open(entry.path())?;
            io::copy(&mut src, &mut writer)
                .map_err(|err| ShopError::BuildFailure(err.to_string()))?;
        }
        writer.finish()?;
    }
    tmp.persist(out)
        .map_err(|err| ShopError::BuildFailure(err.to_string()))?;
    Ok(())
}

fn fingerprint(input: &str, hex_len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())[..hex_len].to_string()
}

fn mtime_secs(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogScanner;
    use std::io::{Read, Write};

    fn scanner_for(root: &Path) -> CatalogScanner {
        CatalogScanner::new(
            root.to_path_buf(),
            root.join("static"),
            root.join("data/category_meta.json"),
        )
    }

    fn dir_fixture() -> (tempfile::TempDir, Category, ArtifactCache) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Pakiet");
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("zgoda.pdf"), b"zgoda").unwrap();
        std::fs::write(root.join("docs/wywiad.pdf"), b"wywiad").unwrap();
        let cat = scanner_for(tmp.path()).category("pakiet").unwrap();
        let cache = ArtifactCache::new(tmp.path().join("cache"));
        (tmp, cat, cache)
    }

    fn zip_fixture() -> (tempfile::TempDir, Category, ArtifactCache) {
        let tmp = tempfile::tempdir().unwrap();
        let file = File::create(tmp.path().join("Pakiet.zip")).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        writer.start_file("folder/karta.pdf", options).unwrap();
        writer.write_all(b"karta").unwrap();
        writer.start_file("zgoda.pdf", options).unwrap();
        writer.write_all(b"zgoda").unwrap();
        writer.finish().unwrap();
        let cat = scanner_for(tmp.path()).category("pakiet").unwrap();
        let cache = ArtifactCache::new(tmp.path().join("cache"));
        (tmp, cat, cache)
    }

    #[test]
    fn test_bundle_contains_relative_entries() {
        let (_tmp, cat, cache) = dir_fixture();
        let path = cache.bundle_for_directory(&cat).unwrap();

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["docs/wywiad.pdf", "zgoda.pdf"]);

        let mut content = String::new();
        archive
            .by_name("docs/wywiad.pdf")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "wywiad");
    }

    #[test]
    fn test_bundle_cache_idempotent() {
        let (_tmp, cat, cache) = dir_fixture();
        let first = cache.bundle_for_directory(&cat).unwrap();
        let mtime_before = std::fs::metadata(&first).unwrap().modified().unwrap();

        let second = cache.bundle_for_directory(&cat).unwrap();
        assert_eq!(first, second);
        let mtime_after = std::fs::metadata(&second).unwrap().modified().unwrap();
        assert_eq!(mtime_before, mtime_after);
    }

    #[test]
    fn test_bundle_key_changes_with_source_mtime() {
        let (_tmp, cat, cache) = dir_fixture();
        let first = cache.bundle_for_directory(&cat).unwrap();

        // Push the directory mtime forward; the old artifact stays behind
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(120);
        File::open(&cat.source_path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let second = cache.bundle_for_directory(&cat).unwrap();
        assert_ne!(first, second);
        assert!(first.exists());
    }

    #[test]
    fn test_bundle_leaves_no_partial_files() {
        let (_tmp, cat, cache) = dir_fixture();
        let path = cache.bundle_for_directory(&cat).unwrap();
        let dir = path.parent().unwrap();
        let entries: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].ends_with(".zip"));
    }

    #[test]
    fn test_extract_member_round_trip() {
        let (_tmp, cat, cache) = zip_fixture();
        let scanner = scanner_for(cat.source_path.parent().unwrap());
        let members = scanner.members(&cat);
        let karta = members.iter().find(|m| m.display == "folder/karta.pdf").unwrap();

        let path = cache.extract_member(&cat, karta).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"karta");
        assert!(path.to_string_lossy().ends_with(".pdf"));

        // Cached on second call
        let again = cache.extract_member(&cat, karta).unwrap();
        assert_eq!(path, again);
    }

    #[test]
    fn test_extract_missing_member_not_found() {
        let (_tmp, cat, cache) = zip_fixture();
        let ghost = Member {
            display: "ghost.pdf".into(),
            rel: "ghost.pdf".into(),
            abs: None,
            id: "ghost-0000000000".into(),
            ext: ".pdf".into(),
        };
        match cache.extract_member(&cat, &ghost) {
            Err(ShopError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_bundle_rejects_non_directory_category() {
        let (_tmp, cat, cache) = zip_fixture();
        assert!(matches!(
            cache.bundle_for_directory(&cat),
            Err(ShopError::NotFound(_))
        ));
    }
}
