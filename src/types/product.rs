//! Sellable entity model
//!
//! Everything the catalog can list is a [`Product`] with an [`EntityId`]
//! discriminating the four entity kinds. The wire form of an id
//! (`dbcat:<slug>`, `dbitem:<slug>:<member>`, `cat:<slug>`, `custom:<id>`)
//! is what override documents and payment records are keyed by, so ids
//! round-trip losslessly through [`std::fmt::Display`] / [`std::str::FromStr`].

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Card image used when no real image is known for an entity
pub const PLACEHOLDER_CARD: &str = "cards/_placeholder.png";

/// Identity of a sellable entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    /// Navigation card for a scanned category (`dbcat:<slug>`)
    ScannedCategory { slug: String },
    /// Purchasable file inside a scanned category (`dbitem:<slug>:<member>`)
    Item { category: String, member: String },
    /// Navigation card for a free-standing custom category (`cat:<slug>`)
    CustomCategory { slug: String },
    /// Admin-entered product with its own uploaded file (`custom:<id>`)
    Custom { id: String },
}

impl EntityId {
    pub fn scanned_category(slug: impl Into<String>) -> Self {
        Self::ScannedCategory { slug: slug.into() }
    }

    pub fn item(category: impl Into<String>, member: impl Into<String>) -> Self {
        Self::Item {
            category: category.into(),
            member: member.into(),
        }
    }

    pub fn custom_category(slug: impl Into<String>) -> Self {
        Self::CustomCategory { slug: slug.into() }
    }

    pub fn custom(id: impl Into<String>) -> Self {
        Self::Custom { id: id.into() }
    }

    /// True for both flavors of navigation card
    pub fn is_category_card(&self) -> bool {
        matches!(self, Self::ScannedCategory { .. } | Self::CustomCategory { .. })
    }

    /// Slug of the scanned category this entity belongs to, if any
    pub fn category_slug(&self) -> Option<&str> {
        match self {
            Self::ScannedCategory { slug } => Some(slug),
            Self::Item { category, .. } => Some(category),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScannedCategory { slug } => write!(f, "dbcat:{}", slug),
            Self::Item { category, member } => write!(f, "dbitem:{}:{}", category, member),
            Self::CustomCategory { slug } => write!(f, "cat:{}", slug),
            Self::Custom { id } => write!(f, "custom:{}", id),
        }
    }
}

impl FromStr for EntityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(slug) = s.strip_prefix("dbcat:") {
            return Ok(Self::scanned_category(slug));
        }
        if let Some(rest) = s.strip_prefix("dbitem:") {
            let (category, member) = rest
                .split_once(':')
                .ok_or_else(|| format!("malformed item id: {}", s))?;
            return Ok(Self::item(category, member));
        }
        if let Some(slug) = s.strip_prefix("cat:") {
            return Ok(Self::custom_category(slug));
        }
        if let Some(id) = s.strip_prefix("custom:") {
            return Ok(Self::custom(id));
        }
        Err(format!("unknown entity id form: {}", s))
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// A materialized catalog entry: identity plus the mutable projection the
/// override layers act on.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: EntityId,
    pub title: String,
    /// Display category name (shown in cart and listing filters)
    pub category: String,
    pub price: f64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Relative path under the goods dir; only set on custom products
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_file: Option<String>,
    /// Slug of the scanned category a custom product logically belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_category: Option<String>,
}

impl Product {
    pub fn is_category_card(&self) -> bool {
        self.id.is_category_card()
    }

    pub fn primary_image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// True when the image is missing or the shared placeholder
    pub fn has_placeholder_image(&self) -> bool {
        match self.primary_image() {
            None => true,
            Some(img) => img.ends_with(PLACEHOLDER_CARD),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_id_round_trip() {
        let ids = [
            EntityId::scanned_category("tatuaz"),
            EntityId::item("tatuaz", "zgoda-pdf-c1cc6f482f"),
            EntityId::custom_category("vouchery"),
            EntityId::custom("3f2a77e0c1d24a6f9b2e5d8c4a1f0b9d"),
        ];
        for id in ids {
            let wire = id.to_string();
            let back: EntityId = wire.parse().unwrap();
            assert_eq!(back, id);
        }
    }

    #[test]
    fn test_wire_id_forms() {
        assert_eq!(EntityId::scanned_category("zgoda").to_string(), "dbcat:zgoda");
        assert_eq!(EntityId::item("zgoda", "abc").to_string(), "dbitem:zgoda:abc");
        assert_eq!(EntityId::custom_category("zgoda").to_string(), "cat:zgoda");
    }

    #[test]
    fn test_unknown_prefix_rejected() {
        assert!("product:123".parse::<EntityId>().is_err());
        assert!("dbitem:missing-member".parse::<EntityId>().is_err());
    }

    #[test]
    fn test_category_card_discrimination() {
        assert!(EntityId::scanned_category("a").is_category_card());
        assert!(EntityId::custom_category("a").is_category_card());
        assert!(!EntityId::item("a", "b").is_category_card());
        assert!(!EntityId::custom("a").is_category_card());
    }

    #[test]
    fn test_serde_as_string() {
        let id = EntityId::item("tatuaz", "abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"dbitem:tatuaz:abc123\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
