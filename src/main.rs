//! vellum - digital document shop core

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vellum::catalog::{CatalogScanner, CatalogService};
use vellum::config::Args;
use vellum::delivery::{ArtifactCache, DigitalGoods};
use vellum::entitlement::{DeliveryService, HttpPaymentVerifier, TokenService};
use vellum::overrides::OverrideStore;
use vellum::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("vellum={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  vellum - digital document shop");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Products root: {}", args.products_root.display());
    info!("Data dir: {}", args.data_dir.display());
    info!("Cache dir: {}", args.cache_dir.display());
    info!("Payment API: {}", args.payment_api_url);
    info!("Token TTL: {}s", args.download_ttl_seconds);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("======================================");

    let tokens = match &args.download_secret {
        Some(secret) => TokenService::new(secret.clone(), args.download_ttl_seconds)?,
        None => TokenService::new_dev(),
    };

    let verifier = HttpPaymentVerifier::new(args.payment_api_url.clone())?;

    let scanner = CatalogScanner::new(
        args.products_root.clone(),
        args.static_dir.clone(),
        args.category_meta_path(),
    );
    let store = OverrideStore::new(args.data_dir.clone());
    let catalog = Arc::new(CatalogService::new(scanner, store, args.static_dir.clone()));

    let delivery = Arc::new(DeliveryService::new(
        Arc::clone(&catalog),
        Arc::new(verifier),
        tokens,
        ArtifactCache::new(args.cache_dir.clone()),
        DigitalGoods::new(args.goods_dir.clone()),
    ));

    let state = Arc::new(AppState {
        args,
        catalog,
        delivery,
    });

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
