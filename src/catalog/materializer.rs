//! Catalog materializer
//!
//! Composes the scanned catalog, the override layers and the custom products
//! into the final ordered entity list. Every call re-reads all inputs fresh,
//! so concurrent invocations each see a consistent snapshot and no mutable
//! state is shared between requests.
//!
//! Composition order is fixed: scanned cards and items, custom category
//! cards, custom products, then the override layers (title, price,
//! description, category, photo), then the deletion set, then the
//! de-duplication pass that collapses competing navigation cards.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::catalog::pricing::price_for;
use crate::catalog::scanner::{CatalogScanner, CategoryMeta};
use crate::catalog::slug::{base_name, slugify};
use crate::overrides::{CustomProductRecord, OverrideStore};
use crate::types::{EntityId, Product, Result, PLACEHOLDER_CARD};

/// Display category shown on navigation cards
const CARDS_CATEGORY: &str = "Pakiety";
/// Default display category for custom products
const DEFAULT_CUSTOM_CATEGORY: &str = "Produkty";

/// Materializes sellable entities from the scanner and the override store
pub struct CatalogService {
    scanner: CatalogScanner,
    store: OverrideStore,
    static_dir: PathBuf,
}

impl CatalogService {
    pub fn new(scanner: CatalogScanner, store: OverrideStore, static_dir: PathBuf) -> Self {
        Self {
            scanner,
            store,
            static_dir,
        }
    }

    pub fn scanner(&self) -> &CatalogScanner {
        &self.scanner
    }

    pub fn overrides(&self) -> &OverrideStore {
        &self.store
    }

    /// Produce the full ordered entity list
    pub fn materialize(&self) -> Vec<Product> {
        let titles = self.store.titles();
        let prices = self.store.prices();
        let descriptions = self.store.descriptions();
        let category_overrides = self.store.categories();
        let photos = self.store.photos();
        let deleted = self.store.deleted();
        let meta = self.scanner.load_meta();

        let (mut cards, mut items) = self.scanned_entities();
        cards.sort_by_key(|p| p.title.to_lowercase());
        items.sort_by_key(|p| (p.category.to_lowercase(), p.title.to_lowercase()));

        let custom_products: Vec<Product> = self
            .store
            .custom_products()
            .into_iter()
            .filter_map(|rec| custom_product(rec, &meta))
            .collect();

        // Custom category cards pick their fallback thumbnail from the first
        // product in the category, so photo overrides must be visible to the
        // card builder as well as to the final list (idempotent either way).
        let mut custom_for_cards = custom_products.clone();
        apply_photo_overrides(&mut custom_for_cards, &photos);

        let blocked_slugs: HashSet<String> = cards
            .iter()
            .filter_map(|p| p.id.category_slug().map(str::to_string))
            .collect();
        let blocked_names: HashSet<String> =
            cards.iter().map(|p| p.title.trim().to_lowercase()).collect();
        let custom_cards =
            self.custom_category_cards(&custom_for_cards, &blocked_slugs, &blocked_names, &photos);

        let mut all = cards;
        all.extend(items);
        all.extend(custom_cards);
        all.extend(custom_products);

        apply_title_overrides(&mut all, &titles);
        apply_price_overrides(&mut all, &prices);
        apply_description_overrides(&mut all, &descriptions);
        apply_category_overrides(&mut all, &category_overrides);
        apply_photo_overrides(&mut all, &photos);
        all.retain(|p| !deleted.contains(&p.id.to_string()));

        let all = dedupe_category_cards(all);
        debug!(entities = all.len(), "Catalog materialized");
        all
    }

    /// Find one materialized entity by id
    pub fn product(&self, id: &EntityId) -> Option<Product> {
        self.materialize().into_iter().find(|p| &p.id == id)
    }

    /// Soft-delete an entity. Deleting a scanned category card cascades to
    /// every item in that category, and all overrides held for the removed
    /// ids are purged. Returns the full set of removed ids.
    pub fn delete_entity(&self, id: &EntityId) -> Result<Vec<String>> {
        let mut ids = vec![id.to_string()];
        if let EntityId::ScannedCategory { slug } = id {
            if let Some(cat) = self.scanner.category(slug) {
                for member in self.scanner.members(&cat) {
                    ids.push(EntityId::item(slug.clone(), member.id).to_string());
                }
            }
        }
        self.store.mark_deleted(&ids)?;
        self.store.purge(&ids)?;
        Ok(ids)
    }

    /// Build cards and items for every scanned category
    fn scanned_entities(&self) -> (Vec<Product>, Vec<Product>) {
        let mut cards = Vec::new();
        let mut items = Vec::new();

        for cat in self.scanner.scan() {
            let members = self.scanner.members(&cat);

            // Card thumbnail: first member's pre-rendered preview, then the
            // prebuilt category card, then the placeholder.
            let mut card_image = PLACEHOLDER_CARD.to_string();
            if let Some(first) = members.first() {
                let thumb = format!("cards/items/{}/{}.png", cat.slug, first.id);
                if self.static_dir.join(&thumb).exists() {
                    card_image = thumb;
                }
            }
            if card_image == PLACEHOLDER_CARD && cat.card_image != PLACEHOLDER_CARD {
                card_image = cat.card_image.clone();
            }

            cards.push(Product {
                id: EntityId::scanned_category(&cat.slug),
                title: cat.display_name.clone(),
                category: CARDS_CATEGORY.to_string(),
                price: 0.0,
                description: cat.short_desc.clone(),
                image: Some(card_image.clone()),
                download_file: None,
                bound_category: None,
            });

            let count = members.len();
            for member in &members {
                let file_name = base_name(&member.display).trim().to_string();
                let thumb = format!("cards/items/{}/{}.png", cat.slug, member.id);
                let image = if self.static_dir.join(&thumb).exists() {
                    thumb
                } else {
                    card_image.clone()
                };
                items.push(Product {
                    id: EntityId::item(&cat.slug, &member.id),
                    title: if file_name.is_empty() {
                        member.id.clone()
                    } else {
                        file_name
                    },
                    category: cat.display_name.clone(),
                    price: price_for(cat.price_from, count, &member.rel),
                    description: String::new(),
                    image: Some(image),
                    download_file: None,
                    bound_category: None,
                });
            }
        }

        (cards, items)
    }

    /// Navigation cards for custom categories not already represented by a
    /// scanned category (matched by slug and by case-insensitive name)
    fn custom_category_cards(
        &self,
        custom_products: &[Product],
        blocked_slugs: &HashSet<String>,
        blocked_names: &HashSet<String>,
        photos: &HashMap<String, String>,
    ) -> Vec<Product> {
        let mut names = self.store.custom_categories();
        let mut seen: HashSet<String> = names.iter().map(|n| n.to_lowercase()).collect();
        for product in custom_products {
            let name = product.category.trim();
            if !name.is_empty() && seen.insert(name.to_lowercase()) {
                names.push(name.to_string());
            }
        }

        let mut first_image: HashMap<String, String> = HashMap::new();
        for product in custom_products {
            if let Some(img) = product.primary_image() {
                first_image
                    .entry(product.category.trim().to_lowercase())
                    .or_insert_with(|| img.to_string());
            }
        }

        let mut cards = Vec::new();
        for name in names {
            let name_lc = name.trim().to_lowercase();
            let slug = slugify(&name);
            if blocked_names.contains(&name_lc) || blocked_slugs.contains(&slug) {
                continue;
            }

            let id = EntityId::custom_category(&slug);
            let image = photos
                .get(&id.to_string())
                .cloned()
                .or_else(|| {
                    // An independent prebuilt card image keeps the thumbnail
                    // from following the newest product image.
                    let card_rel = format!("cards/{}.png", slug);
                    self.static_dir.join(&card_rel).exists().then_some(card_rel)
                })
                .or_else(|| first_image.get(&name_lc).cloned())
                .unwrap_or_else(|| PLACEHOLDER_CARD.to_string());

            cards.push(Product {
                id,
                title: name,
                category: CARDS_CATEGORY.to_string(),
                price: 0.0,
                description: String::new(),
                image: Some(image),
                download_file: None,
                bound_category: None,
            });
        }
        cards
    }
}

/// Convert a persisted custom product record, inferring the scanned-category
/// binding from the category name when the record has none
fn custom_product(rec: CustomProductRecord, meta: &HashMap<String, CategoryMeta>) -> Option<Product> {
    let id: EntityId = match rec.id.trim().parse() {
        Ok(id @ EntityId::Custom { .. }) => id,
        _ => {
            warn!(id = %rec.id, "Skipping custom product with non-custom id");
            return None;
        }
    };

    let category = {
        let trimmed = rec.category.trim();
        if trimmed.is_empty() {
            DEFAULT_CUSTOM_CATEGORY.to_string()
        } else {
            trimmed.to_string()
        }
    };

    let bound_category = rec
        .docu_cat_slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            let inferred = slugify(&category);
            meta.contains_key(&inferred).then_some(inferred)
        });

    let image = {
        let trimmed = rec.image.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };
    let download_file = {
        let trimmed = rec.file.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    Some(Product {
        id,
        title: rec.title.trim().to_string(),
        category,
        price: rec.price,
        description: rec.description.trim().to_string(),
        image,
        download_file,
        bound_category,
    })
}

/// Replace titles for overridden ids
pub fn apply_title_overrides(products: &mut [Product], overrides: &HashMap<String, String>) {
    if overrides.is_empty() {
        return;
    }
    for product in products.iter_mut() {
        if let Some(title) = overrides.get(&product.id.to_string()) {
            product.title = title.clone();
        }
    }
}

/// Replace prices for overridden ids
pub fn apply_price_overrides(products: &mut [Product], overrides: &HashMap<String, f64>) {
    if overrides.is_empty() {
        return;
    }
    for product in products.iter_mut() {
        if let Some(price) = overrides.get(&product.id.to_string()) {
            product.price = *price;
        }
    }
}

/// Replace descriptions for overridden ids; entities that end up with no
/// description at all fall back to their title
pub fn apply_description_overrides(products: &mut [Product], overrides: &HashMap<String, String>) {
    for product in products.iter_mut() {
        if let Some(text) = overrides.get(&product.id.to_string()) {
            if !text.trim().is_empty() {
                product.description = text.trim().to_string();
                continue;
            }
        }
        if product.description.trim().is_empty() {
            product.description = product.title.clone();
        }
    }
}

/// Replace display categories for overridden ids
pub fn apply_category_overrides(products: &mut [Product], overrides: &HashMap<String, String>) {
    if overrides.is_empty() {
        return;
    }
    for product in products.iter_mut() {
        if let Some(category) = overrides.get(&product.id.to_string()) {
            product.category = category.clone();
        }
    }
}

/// Replace images for overridden ids
pub fn apply_photo_overrides(products: &mut [Product], overrides: &HashMap<String, String>) {
    if overrides.is_empty() {
        return;
    }
    for product in products.iter_mut() {
        if let Some(image) = overrides.get(&product.id.to_string()) {
            product.image = Some(image.clone());
        }
    }
}

/// Collapse competing navigation cards for the same logical category.
///
/// Cards are grouped by the slug of their (post-override) title; one card
/// survives per group, the scanned card preferred over the custom one. A
/// real image on the discarded custom card replaces the kept card's image;
/// otherwise images only transfer onto placeholders. Discarded ids are
/// removed entirely and the final list is guaranteed id-unique.
pub fn dedupe_category_cards(items: Vec<Product>) -> Vec<Product> {
    let mut winners: HashMap<String, Product> = HashMap::new();
    let mut losers: HashSet<String> = HashSet::new();

    for product in items.iter().filter(|p| p.is_category_card()) {
        let key = slugify(&product.title);
        let previous = match winners.get(&key) {
            None => {
                winners.insert(key, product.clone());
                continue;
            }
            Some(prev) => prev.clone(),
        };

        let prev_is_scanned = matches!(previous.id, EntityId::ScannedCategory { .. });
        let cur_is_scanned = matches!(product.id, EntityId::ScannedCategory { .. });
        let (mut keep, drop) = if cur_is_scanned && !prev_is_scanned {
            (product.clone(), previous)
        } else {
            (previous, product.clone())
        };

        let drop_img = drop.primary_image().unwrap_or("").to_string();

        // An admin-uploaded thumbnail often lives on the custom card id;
        // a real image there outranks the scanned card's default preview.
        let prefer_drop = matches!(drop.id, EntityId::CustomCategory { .. })
            && !drop.has_placeholder_image();

        if !drop_img.is_empty() && (prefer_drop || keep.has_placeholder_image()) {
            keep.image = Some(drop_img);
        }

        losers.insert(drop.id.to_string());
        winners.insert(key, keep);
    }

    if losers.is_empty() {
        return items;
    }

    let mut seen_ids = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for product in items {
        if losers.contains(&product.id.to_string()) {
            continue;
        }
        let product = if product.is_category_card() {
            match winners.get(&slugify(&product.title)) {
                Some(winner) if winner.id == product.id => winner.clone(),
                _ => product,
            }
        } else {
            product
        };
        if seen_ids.insert(product.id.to_string()) {
            out.push(product);
        }
    }
    out
}
