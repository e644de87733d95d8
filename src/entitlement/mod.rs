//! Entitlement subsystem: payment verification, download tokens, delivery

pub mod service;
pub mod token;
pub mod verifier;

pub use service::{DeliveryService, DownloadLink, ResolvedFile};
pub use token::{DownloadClaim, TokenService};
pub use verifier::{HttpPaymentVerifier, PaymentRecord, PaymentVerifier};
