//! Configuration for vellum
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// vellum - digital document shop core
#[derive(Parser, Debug, Clone)]
#[command(name = "vellum")]
#[command(about = "Catalog materialization and entitlement-gated delivery for a digital document shop")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Root directory of the source catalog (directories and .zip files)
    #[arg(long, env = "PRODUCTS_ROOT", default_value = "products")]
    pub products_root: PathBuf,

    /// Directory holding override documents and category metadata
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Static assets directory (card images, item previews)
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Directory for cached bundles and extracted members
    #[arg(long, env = "CACHE_DIR", default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Protected digital goods directory (manifest files, custom uploads)
    #[arg(long, env = "DIGITAL_GOODS_DIR", default_value = "digital_goods")]
    pub goods_dir: PathBuf,

    /// Base URL of the payment verification API
    #[arg(long, env = "PAYMENT_API_URL", default_value = "http://localhost:9090")]
    pub payment_api_url: String,

    /// Secret for download token signing (required in production)
    #[arg(long, env = "DOWNLOAD_SECRET")]
    pub download_secret: Option<String>,

    /// Download token lifetime in seconds (default 7 days)
    #[arg(long, env = "DOWNLOAD_TTL_SECONDS", default_value = "604800")]
    pub download_ttl_seconds: u64,

    /// Enable development mode (insecure default token secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Path of the category metadata document
    pub fn category_meta_path(&self) -> PathBuf {
        self.data_dir.join("category_meta.json")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.download_secret {
                None => return Err("DOWNLOAD_SECRET is required in production mode".to_string()),
                Some(secret) if secret.len() < 32 => {
                    return Err("DOWNLOAD_SECRET must be at least 32 characters".to_string())
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
