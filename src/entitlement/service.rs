//! Entitlement-gated delivery
//!
//! Ties the pieces together: after a verified payment the service mints one
//! download link per deliverable, and a redemption walks the full chain
//! again (signature, expiry, payment, membership, file resolution) before a
//! single byte leaves the goods dir. Nothing about a token shortcuts the
//! grant; step 2 onward runs on every redemption.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::catalog::scanner::CategoryKind;
use crate::catalog::slug::base_name;
use crate::catalog::CatalogService;
use crate::delivery::{ArtifactCache, DigitalGoods};
use crate::entitlement::token::{DownloadClaim, TokenService};
use crate::entitlement::verifier::{PaymentRecord, PaymentVerifier};
use crate::types::{EntityId, Result, ShopError};

/// A named, tokenized download offered to the customer
#[derive(Debug, Clone, Serialize)]
pub struct DownloadLink {
    pub name: String,
    pub token: String,
}

/// A redeemed deliverable: concrete file plus the filename to suggest
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub file_name: String,
}

pub struct DeliveryService {
    catalog: Arc<CatalogService>,
    verifier: Arc<dyn PaymentVerifier>,
    tokens: TokenService,
    artifacts: ArtifactCache,
    goods: DigitalGoods,
}

impl DeliveryService {
    pub fn new(
        catalog: Arc<CatalogService>,
        verifier: Arc<dyn PaymentVerifier>,
        tokens: TokenService,
        artifacts: ArtifactCache,
        goods: DigitalGoods,
    ) -> Self {
        Self {
            catalog,
            verifier,
            tokens,
            artifacts,
            goods,
        }
    }

    /// Re-derive the entitlement grant; unpaid sessions are terminal
    async fn entitlement(&self, session_id: &str) -> Result<PaymentRecord> {
        if session_id.trim().is_empty() {
            return Err(ShopError::InvalidLink("missing session".into()));
        }
        let record = self.verifier.verify(session_id).await?;
        if !record.paid {
            return Err(ShopError::PaymentNotConfirmed("payment not completed".into()));
        }
        Ok(record)
    }

    /// Mint download links for everything a paid session purchased.
    ///
    /// Purchased ids the catalog knows become item, bundle or custom-file
    /// links; the rest fall back to the legacy goods manifest.
    pub async fn issue_downloads(&self, session_id: &str) -> Result<Vec<DownloadLink>> {
        let record = self.entitlement(session_id).await?;

        let catalog = self.catalog.materialize();
        let by_id: HashMap<String, &crate::types::Product> =
            catalog.iter().map(|p| (p.id.to_string(), p)).collect();

        let mut links = Vec::new();
        let mut legacy_ids = Vec::new();

        for pid in &record.entity_ids {
            let product = match by_id.get(pid) {
                Some(product) => *product,
                None => {
                    legacy_ids.push(pid.clone());
                    continue;
                }
            };

            match &product.id {
                EntityId::Item { category, member } => {
                    let claim = DownloadClaim::Item {
                        category: category.clone(),
                        member: member.clone(),
                    };
                    links.push(DownloadLink {
                        name: format!("{} / {}", product.category, product.title),
                        token: self.tokens.mint(session_id, claim)?,
                    });
                }
                EntityId::ScannedCategory { slug } => {
                    // A purchased category delivers exactly its bundle, not
                    // every internal file listed separately.
                    let Some(cat) = self.catalog.scanner().category(slug) else {
                        continue;
                    };
                    let bundle_name = cat
                        .source_path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| format!("{}.zip", slug));
                    let claim = DownloadClaim::Bundle {
                        category: slug.clone(),
                    };
                    links.push(DownloadLink {
                        name: format!("{} - {}", product.title, bundle_name),
                        token: self.tokens.mint(session_id, claim)?,
                    });
                }
                EntityId::Custom { .. } => {
                    if product
                        .download_file
                        .as_deref()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .is_none()
                    {
                        continue;
                    }
                    let claim = DownloadClaim::Custom {
                        product: pid.clone(),
                    };
                    links.push(DownloadLink {
                        name: product.title.clone(),
                        token: self.tokens.mint(session_id, claim)?,
                    });
                }
                // Navigation-only, nothing to deliver
                EntityId::CustomCategory { .. } => {}
            }
        }

        for rel in self.goods.resolve_files(&legacy_ids) {
            let name = base_name(&rel).to_string();
            let claim = DownloadClaim::Legacy { path: rel };
            links.push(DownloadLink {
                name,
                token: self.tokens.mint(session_id, claim)?,
            });
        }

        info!(session = %session_id, links = links.len(), "Download links issued");
        Ok(links)
    }

    /// Redeem a token into a concrete file.
    ///
    /// Chain: signature -> expiry -> payment -> membership -> resolution.
    /// Each step failing maps to its distinct error kind; nothing is served
    /// on a partial pass.
    pub async fn redeem(&self, token: &str) -> Result<ResolvedFile> {
        let payload = self.tokens.verify(token)?;
        let record = self.entitlement(&payload.sid).await?;
        let purchased: HashSet<&str> = record.entity_ids.iter().map(String::as_str).collect();

        let resolved = match &payload.claim {
            DownloadClaim::Item { category, member } => {
                let item_id = EntityId::item(category.clone(), member.clone()).to_string();
                let bundle_id = EntityId::scanned_category(category.clone()).to_string();
                // A whole-category purchase also covers each of its files
                if !purchased.contains(item_id.as_str())
                    && !purchased.contains(bundle_id.as_str())
                {
                    return Err(ShopError::AccessDenied(
                        "file was not part of this purchase".into(),
                    ));
                }

                let cat = self
                    .catalog
                    .scanner()
                    .category(category)
                    .ok_or_else(|| ShopError::NotFound("category not found".into()))?;
                let member = self
                    .catalog
                    .scanner()
                    .member_by_id(&cat, member)
                    .ok_or_else(|| ShopError::NotFound("file not found".into()))?;

                let path = match cat.kind {
                    CategoryKind::Dir => {
                        let path = member
                            .abs
                            .clone()
                            .ok_or_else(|| ShopError::NotFound("file not found".into()))?;
                        if !path.is_file() {
                            return Err(ShopError::NotFound("file not found".into()));
                        }
                        path
                    }
                    CategoryKind::Zip => self.artifacts.extract_member(&cat, &member)?,
                };

                ResolvedFile {
                    file_name: base_name(&member.display).to_string(),
                    path,
                }
            }

            DownloadClaim::Bundle { category } => {
                let bundle_id = EntityId::scanned_category(category.clone()).to_string();
                if !purchased.contains(bundle_id.as_str()) {
                    return Err(ShopError::AccessDenied(
                        "category was not part of this purchase".into(),
                    ));
                }

                let cat = self
                    .catalog
                    .scanner()
                    .category(category)
                    .ok_or_else(|| ShopError::NotFound("category not found".into()))?;

                match cat.kind {
                    CategoryKind::Zip => {
                        if !cat.source_path.is_file() {
                            return Err(ShopError::NotFound("file not found".into()));
                        }
                        let file_name = cat
                            .source_path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_else(|| format!("{}.zip", cat.slug));
                        ResolvedFile {
                            path: cat.source_path.clone(),
                            file_name,
                        }
                    }
                    CategoryKind::Dir => ResolvedFile {
                        path: self.artifacts.bundle_for_directory(&cat)?,
                        file_name: format!("{}.zip", cat.slug),
                    },
                }
            }

            DownloadClaim::Custom { product } => {
                if !purchased.contains(product.as_str()) {
                    return Err(ShopError::AccessDenied(
                        "product was not part of this purchase".into(),
                    ));
                }
                let id: EntityId = product
                    .parse()
                    .map_err(|_| ShopError::InvalidLink("malformed token".into()))?;
                let prod = self
                    .catalog
                    .product(&id)
                    .ok_or_else(|| ShopError::NotFound("product not found".into()))?;
                let rel = prod
                    .download_file
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ShopError::NotFound("file not found".into()))?;

                let path = self.goods.safe_path(rel)?;
                if !path.is_file() {
                    return Err(ShopError::NotFound("file not found".into()));
                }
                ResolvedFile {
                    file_name: base_name(rel).to_string(),
                    path,
                }
            }

            DownloadClaim::Legacy { path: rel } => {
                // Membership for manifest files is re-derived the same way
                // the links were minted
                let entitled = self.goods.resolve_files(&record.entity_ids);
                if !entitled.iter().any(|file| file == rel) {
                    return Err(ShopError::AccessDenied(
                        "file was not part of this purchase".into(),
                    ));
                }
                let path = self.goods.safe_path(rel)?;
                if !path.is_file() {
                    return Err(ShopError::NotFound("file not found".into()));
                }
                ResolvedFile {
                    file_name: base_name(rel).to_string(),
                    path,
                }
            }
        };

        info!(session = %payload.sid, file = %resolved.file_name, "Download redeemed");
        Ok(resolved)
    }
}
