//! Payment verification boundary
//!
//! The shop never trusts client-supplied purchase state. Every mint and
//! every redemption re-derives the entitlement grant from the payment
//! provider through this trait. Any non-paid or transport-error result is
//! terminal for the request; callers may retry the whole request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::types::{Result, ShopError};

/// The externally verified fact about a purchase session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub paid: bool,
    /// Wire entity ids the session paid for
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
}

/// External payment-provider capability
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(&self, session_id: &str) -> Result<PaymentRecord>;
}

/// Payment verification against a checkout-session HTTP endpoint
pub struct HttpPaymentVerifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPaymentVerifier {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|err| ShopError::Config(format!("payment client: {}", err)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl PaymentVerifier for HttpPaymentVerifier {
    async fn verify(&self, session_id: &str) -> Result<PaymentRecord> {
        let url = format!(
            "{}/sessions/{}",
            self.base_url.trim_end_matches('/'),
            session_id
        );

        let response = self.client.get(&url).send().await.map_err(|err| {
            warn!(error = %err, "Payment verification request failed");
            ShopError::PaymentNotConfirmed("payment verification unavailable".into())
        })?;

        if !response.status().is_success() {
            return Err(ShopError::PaymentNotConfirmed(
                "unknown payment session".into(),
            ));
        }

        response.json::<PaymentRecord>().await.map_err(|err| {
            warn!(error = %err, "Malformed payment verification response");
            ShopError::PaymentNotConfirmed("malformed verification response".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_record_defaults() {
        let record: PaymentRecord = serde_json::from_str(r#"{"paid": true}"#).unwrap();
        assert!(record.paid);
        assert!(record.entity_ids.is_empty());
        assert!(record.customer_email.is_none());
    }

    #[test]
    fn test_payment_record_full() {
        let record: PaymentRecord = serde_json::from_str(
            r#"{"paid": true, "entity_ids": ["dbcat:zgoda"], "customer_email": "a@b.pl"}"#,
        )
        .unwrap();
        assert_eq!(record.entity_ids, vec!["dbcat:zgoda"]);
        assert_eq!(record.customer_email.as_deref(), Some("a@b.pl"));
    }
}
