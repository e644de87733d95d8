//! Override store
//!
//! Five independent id-keyed layers (title, price, description, category,
//! photo) plus the deletion set, the free-standing custom-category list and
//! the custom-product records, each persisted as its own JSON document under
//! the data dir. Reads fail open (a broken document degrades to an empty
//! layer); writes always go through a temp-file-then-rename so concurrent
//! readers never observe a partially written document.
//!
//! The store is a thin repository over the documents: callers get a fresh
//! snapshot per call, nothing is cached across calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::warn;
use uuid::Uuid;

use crate::types::{EntityId, Result, ShopError};

/// One override layer; each maps entity id to a replacement value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverrideLayer {
    Title,
    Price,
    Description,
    Category,
    Photo,
}

impl OverrideLayer {
    pub const ALL: [OverrideLayer; 5] = [
        OverrideLayer::Title,
        OverrideLayer::Price,
        OverrideLayer::Description,
        OverrideLayer::Category,
        OverrideLayer::Photo,
    ];

    fn file_name(self) -> &'static str {
        match self {
            OverrideLayer::Title => "title_overrides.json",
            OverrideLayer::Price => "price_overrides.json",
            OverrideLayer::Description => "description_overrides.json",
            OverrideLayer::Category => "category_overrides.json",
            OverrideLayer::Photo => "photo_overrides.json",
        }
    }
}

const DELETED_FILE: &str = "deleted_products.json";
const CUSTOM_CATEGORIES_FILE: &str = "custom_categories.json";
const CUSTOM_PRODUCTS_FILE: &str = "custom_products.json";

/// An admin-entered product record as persisted in `custom_products.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomProductRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    /// Image path, servable without payment
    #[serde(default)]
    pub image: String,
    /// Downloadable file relative to the goods dir; never served directly
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub category: String,
    /// Optional binding to a scanned category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docu_cat_slug: Option<String>,
}

/// Filesystem-backed override repository
pub struct OverrideStore {
    data_dir: PathBuf,
}

impl OverrideStore {
    pub fn new(data_dir: PathBuf) -> Self {
        if let Err(err) = std::fs::create_dir_all(&data_dir) {
            warn!(error = %err, "Could not create override data dir");
        }
        Self { data_dir }
    }

    fn read_value(&self, file_name: &str) -> Option<Value> {
        let path = self.data_dir.join(file_name);
        let file = File::open(&path).ok()?;
        match serde_json::from_reader(file) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(document = file_name, error = %err, "Unreadable override document, treating as empty");
                None
            }
        }
    }

    fn write_value(&self, file_name: &str, value: &Value) -> Result<()> {
        let path = self.data_dir.join(file_name);
        let mut tmp = NamedTempFile::new_in(&self.data_dir)?;
        serde_json::to_writer_pretty(&mut tmp, value)?;
        tmp.persist(&path)
            .map_err(|err| ShopError::Internal(format!("override write failed: {}", err)))?;
        Ok(())
    }

    /// Raw map for one layer; unreadable documents yield an empty map
    pub fn layer(&self, layer: OverrideLayer) -> serde_json::Map<String, Value> {
        match self.read_value(layer.file_name()) {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Set one override (last write wins per id)
    pub fn set(&self, layer: OverrideLayer, id: &str, value: Value) -> Result<()> {
        let mut map = self.layer(layer);
        map.insert(id.to_string(), value);
        self.write_value(layer.file_name(), &Value::Object(map))
    }

    /// Remove one override; absent keys are a no-op
    pub fn remove(&self, layer: OverrideLayer, id: &str) -> Result<()> {
        let mut map = self.layer(layer);
        if map.remove(id).is_some() {
            self.write_value(layer.file_name(), &Value::Object(map))?;
        }
        Ok(())
    }

    fn string_layer(&self, layer: OverrideLayer) -> HashMap<String, String> {
        self.layer(layer)
            .into_iter()
            .filter_map(|(id, value)| {
                let text = value.as_str()?.trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some((id, text))
                }
            })
            .collect()
    }

    pub fn titles(&self) -> HashMap<String, String> {
        self.string_layer(OverrideLayer::Title)
    }

    /// Price layer, tolerating numbers persisted as strings
    pub fn prices(&self) -> HashMap<String, f64> {
        self.layer(OverrideLayer::Price)
            .into_iter()
            .filter_map(|(id, value)| {
                let price = match value {
                    Value::Number(n) => n.as_f64()?,
                    Value::String(s) => s.trim().parse().ok()?,
                    _ => return None,
                };
                Some((id, price))
            })
            .collect()
    }

    pub fn descriptions(&self) -> HashMap<String, String> {
        self.string_layer(OverrideLayer::Description)
    }

    pub fn categories(&self) -> HashMap<String, String> {
        self.string_layer(OverrideLayer::Category)
    }

    pub fn photos(&self) -> HashMap<String, String> {
        self.string_layer(OverrideLayer::Photo)
    }

    /// The soft-deletion set. Accepts both the list form and the legacy
    /// `{id: true}` map form.
    pub fn deleted(&self) -> HashSet<String> {
        match self.read_value(DELETED_FILE) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::Object(map)) => map
                .into_iter()
                .filter(|(_, v)| v.as_bool().unwrap_or(false))
                .map(|(k, _)| k)
                .collect(),
            _ => HashSet::new(),
        }
    }

    /// Add ids to the deletion set
    pub fn mark_deleted(&self, ids: &[String]) -> Result<()> {
        let mut deleted = self.deleted();
        deleted.extend(ids.iter().cloned());
        let mut sorted: Vec<String> = deleted.into_iter().collect();
        sorted.sort();
        self.write_value(DELETED_FILE, &serde_json::to_value(sorted)?)
    }

    /// Drop every override held for the given ids, across all layers
    pub fn purge(&self, ids: &[String]) -> Result<()> {
        for layer in OverrideLayer::ALL {
            let mut map = self.layer(layer);
            let before = map.len();
            for id in ids {
                map.remove(id);
            }
            if map.len() != before {
                self.write_value(layer.file_name(), &Value::Object(map))?;
            }
        }
        Ok(())
    }

    /// Free-standing custom category names, de-duplicated case-insensitively
    /// with first occurrence order preserved
    pub fn custom_categories(&self) -> Vec<String> {
        let raw = match self.read_value(CUSTOM_CATEGORIES_FILE) {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        };
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for item in raw {
            let name = match item.as_str() {
                Some(s) => s.trim().to_string(),
                None => continue,
            };
            if name.is_empty() || !seen.insert(name.to_lowercase()) {
                continue;
            }
            names.push(name);
        }
        names
    }

    pub fn save_custom_categories(&self, names: &[String]) -> Result<()> {
        self.write_value(CUSTOM_CATEGORIES_FILE, &serde_json::to_value(names)?)
    }

    /// Custom product records; entries without id or title are skipped
    pub fn custom_products(&self) -> Vec<CustomProductRecord> {
        let raw = match self.read_value(CUSTOM_PRODUCTS_FILE) {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        };
        raw.into_iter()
            .filter_map(|item| serde_json::from_value::<CustomProductRecord>(item).ok())
            .filter(|rec| !rec.id.trim().is_empty() && !rec.title.trim().is_empty())
            .collect()
    }

    pub fn save_custom_products(&self, records: &[CustomProductRecord]) -> Result<()> {
        self.write_value(CUSTOM_PRODUCTS_FILE, &serde_json::to_value(records)?)
    }

    /// Append a custom product record, minting a `custom:<uuid>` id when the
    /// record has none
    pub fn add_custom_product(&self, mut record: CustomProductRecord) -> Result<EntityId> {
        if record.id.trim().is_empty() {
            record.id = EntityId::custom(Uuid::new_v4().simple().to_string()).to_string();
        }
        let id: EntityId = record
            .id
            .parse()
            .map_err(|err: String| ShopError::Internal(err))?;
        let mut records = self.custom_products();
        records.push(record);
        self.save_custom_products(&records)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, OverrideStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = OverrideStore::new(tmp.path().join("data"));
        (tmp, store)
    }

    #[test]
    fn test_layers_start_empty_and_round_trip() {
        let (_tmp, store) = store();
        assert!(store.titles().is_empty());

        store
            .set(OverrideLayer::Title, "dbcat:zgoda", Value::from("Nowy tytuł"))
            .unwrap();
        assert_eq!(store.titles().get("dbcat:zgoda").unwrap(), "Nowy tytuł");

        store.remove(OverrideLayer::Title, "dbcat:zgoda").unwrap();
        assert!(store.titles().is_empty());
    }

    #[test]
    fn test_prices_tolerate_string_values() {
        let (_tmp, store) = store();
        store.set(OverrideLayer::Price, "a", Value::from(49.0)).unwrap();
        store.set(OverrideLayer::Price, "b", Value::from("29")).unwrap();
        store.set(OverrideLayer::Price, "c", Value::from("oops")).unwrap();

        let prices = store.prices();
        assert_eq!(prices.get("a"), Some(&49.0));
        assert_eq!(prices.get("b"), Some(&29.0));
        assert!(!prices.contains_key("c"));
    }

    #[test]
    fn test_broken_document_fails_open() {
        let (tmp, store) = store();
        std::fs::write(tmp.path().join("data/title_overrides.json"), b"{not json").unwrap();
        assert!(store.titles().is_empty());

        // A write after a broken read restores a valid document
        store.set(OverrideLayer::Title, "x", Value::from("t")).unwrap();
        assert_eq!(store.titles().len(), 1);
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let (tmp, store) = store();
        store.set(OverrideLayer::Photo, "x", Value::from("cards/x.png")).unwrap();
        let names: Vec<String> = std::fs::read_dir(tmp.path().join("data"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["photo_overrides.json"]);
    }

    #[test]
    fn test_deleted_accepts_list_and_legacy_map() {
        let (tmp, store) = store();
        std::fs::write(
            tmp.path().join("data/deleted_products.json"),
            br#"["dbcat:a", "", "dbitem:a:x"]"#,
        )
        .unwrap();
        let deleted = store.deleted();
        assert_eq!(deleted.len(), 2);
        assert!(deleted.contains("dbcat:a"));

        std::fs::write(
            tmp.path().join("data/deleted_products.json"),
            br#"{"dbcat:a": true, "dbcat:b": false}"#,
        )
        .unwrap();
        let deleted = store.deleted();
        assert!(deleted.contains("dbcat:a"));
        assert!(!deleted.contains("dbcat:b"));
    }

    #[test]
    fn test_mark_deleted_merges_and_sorts() {
        let (_tmp, store) = store();
        store.mark_deleted(&["b".into(), "a".into()]).unwrap();
        store.mark_deleted(&["a".into(), "c".into()]).unwrap();
        let deleted = store.deleted();
        assert_eq!(deleted.len(), 3);
    }

    #[test]
    fn test_purge_clears_all_layers() {
        let (_tmp, store) = store();
        store.set(OverrideLayer::Title, "x", Value::from("t")).unwrap();
        store.set(OverrideLayer::Price, "x", Value::from(29.0)).unwrap();
        store.set(OverrideLayer::Photo, "y", Value::from("cards/y.png")).unwrap();

        store.purge(&["x".into()]).unwrap();
        assert!(store.titles().is_empty());
        assert!(store.prices().is_empty());
        assert_eq!(store.photos().len(), 1);
    }

    #[test]
    fn test_custom_categories_dedup_case_insensitive() {
        let (_tmp, store) = store();
        store
            .save_custom_categories(&[
                "Vouchery".into(),
                "vouchery".into(),
                " ".into(),
                "Szkolenia".into(),
            ])
            .unwrap();
        assert_eq!(store.custom_categories(), vec!["Vouchery", "Szkolenia"]);
    }

    #[test]
    fn test_custom_products_skip_incomplete_records() {
        let (tmp, store) = store();
        std::fs::write(
            tmp.path().join("data/custom_products.json"),
            br#"[
                {"id": "custom:1", "title": "Voucher", "price": 100, "file": "custom_uploads/v.pdf"},
                {"id": "", "title": "No id"},
                {"title": "No id either"}
            ]"#,
        )
        .unwrap();
        let records = store.custom_products();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Voucher");
    }

    #[test]
    fn test_add_custom_product_mints_id() {
        let (_tmp, store) = store();
        let id = store
            .add_custom_product(CustomProductRecord {
                title: "Voucher".into(),
                price: 150.0,
                ..Default::default()
            })
            .unwrap();
        assert!(matches!(id, EntityId::Custom { .. }));
        let records = store.custom_products();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id.to_string());
    }
}
