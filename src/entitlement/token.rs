//! Download token minting and verification
//!
//! Tokens are signed with HS256 and bind a purchase session to a specific
//! deliverable. They are a convenience capability, not entitlement: the
//! payment grant is re-checked at every redemption, the token only bounds
//! the link's lifetime (default 7 days).
//!
//! Expiry is reported distinctly from every other verification failure so
//! the caller can show a friendly "link expired" message.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{Result, ShopError};

/// What a token entitles the holder to download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadClaim {
    /// A single file inside a scanned category
    Item { category: String, member: String },
    /// A whole category as a zip bundle
    Bundle { category: String },
    /// A custom product's uploaded file; carries the wire entity id
    Custom { product: String },
    /// A manifest-resolved file relative to the goods dir
    Legacy { path: String },
}

/// Signed token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Purchase session the token was minted for
    pub sid: String,
    #[serde(flatten)]
    pub claim: DownloadClaim,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Mints and verifies download tokens
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    ttl_seconds: u64,
}

impl TokenService {
    /// Create a token service.
    ///
    /// Returns an error if the secret is empty or too short.
    pub fn new(secret: String, ttl_seconds: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(ShopError::Config(
                "DOWNLOAD_SECRET is required in production mode".into(),
            ));
        }
        if secret.len() < 32 {
            return Err(ShopError::Config(
                "DOWNLOAD_SECRET must be at least 32 characters".into(),
            ));
        }
        Ok(Self {
            secret,
            ttl_seconds,
        })
    }

    /// Create a service for dev mode (fixed insecure secret)
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            ttl_seconds: 7 * 24 * 60 * 60,
        }
    }

    /// Mint a signed token binding `session_id` to `claim`.
    /// No I/O beyond signing.
    pub fn mint(&self, session_id: &str, claim: DownloadClaim) -> Result<String> {
        let now = unix_now()?;
        let payload = TokenPayload {
            sid: session_id.to_string(),
            claim,
            iat: now,
            exp: now + self.ttl_seconds,
        };

        encode(
            &Header::default(),
            &payload,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|err| ShopError::Internal(format!("token signing failed: {}", err)))
    }

    /// Verify signature and expiry, returning the payload.
    ///
    /// Expiry is strict (no leeway) so the TTL bounds the link lifetime
    /// exactly.
    pub fn verify(&self, token: &str) -> Result<TokenPayload> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        match decode::<TokenPayload>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => {
                if data.claims.sid.trim().is_empty() {
                    return Err(ShopError::InvalidLink("missing session".into()));
                }
                Ok(data.claims)
            }
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                match err.kind() {
                    ErrorKind::ExpiredSignature => Err(ShopError::ExpiredLink),
                    ErrorKind::InvalidSignature => {
                        Err(ShopError::InvalidLink("signature mismatch".into()))
                    }
                    _ => Err(ShopError::InvalidLink("malformed token".into())),
                }
            }
        }
    }
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|err| ShopError::Internal(format!("system time error: {}", err)))
}
