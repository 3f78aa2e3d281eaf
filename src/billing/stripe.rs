use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, error};

use super::BillingError;
use crate::config::StripeConfig;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Maximum age of a signed webhook before it is treated as a replay.
pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`).
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), BillingError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(BillingError::InvalidSignature)?;
    if signatures.is_empty() {
        return Err(BillingError::InvalidSignature);
    }
    if now_unix.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS {
        debug!(timestamp, now_unix, "webhook signature outside tolerance");
        return Err(BillingError::InvalidSignature);
    }

    let mut signed = Vec::with_capacity(payload.len() + 16);
    signed.extend_from_slice(timestamp.to_string().as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(payload);

    let matches = signatures.iter().any(|sig| {
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(&signed);
        mac.verify_slice(&expected).is_ok()
    });
    if matches {
        Ok(())
    } else {
        Err(BillingError::InvalidSignature)
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a subscription checkout for `price_id`; the price is validated first.
    async fn create_checkout_session(
        &self,
        price_id: &str,
        customer_email: &str,
    ) -> Result<CheckoutSession, BillingError>;
}

#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct StripeSessionResponse {
    id: String,
    url: Option<String>,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    async fn ensure_price_exists(&self, price_id: &str) -> Result<(), BillingError> {
        let res = self
            .client
            .get(format!("{}/prices/{}", STRIPE_API_BASE, price_id))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;
        match res.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(BillingError::NotFound(format!("price {}", price_id))),
            s => Err(BillingError::Gateway(format!("price lookup returned {}", s))),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        price_id: &str,
        customer_email: &str,
    ) -> Result<CheckoutSession, BillingError> {
        self.ensure_price_exists(price_id).await?;

        let form = [
            ("payment_method_types[]", "card"),
            ("mode", "subscription"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("customer_email", customer_email),
            ("success_url", self.config.success_url.as_str()),
            ("cancel_url", self.config.cancel_url.as_str()),
            ("metadata[plan_id]", price_id),
        ];
        let res = self
            .client
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .bearer_auth(&self.config.api_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            error!(%status, body = %body, "stripe checkout session failed");
            return Err(BillingError::Gateway(format!("checkout session returned {}", status)));
        }
        let session: StripeSessionResponse = res
            .json()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;
        debug!(session_id = %session.id, "checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_valid_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = 1_735_689_600;
        let header = sign(payload, SECRET, now);
        assert!(verify_signature(payload, &header, SECRET, now + 10).is_ok());
    }

    #[test]
    fn accepts_when_any_v1_matches() {
        let payload = b"{}";
        let now = 1_735_689_600;
        let good = sign(payload, SECRET, now);
        let header = format!("t={},v1=deadbeef,{}", now, good.split_once(',').unwrap().1);
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn rejects_wrong_secret_and_modified_payload() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = 1_735_689_600;
        let header = sign(payload, "wrong_secret", now);
        assert!(verify_signature(payload, &header, SECRET, now).is_err());

        let header = sign(payload, SECRET, now);
        let modified = br#"{"type":"checkout.session.completed","hacked":true}"#;
        assert!(verify_signature(modified, &header, SECRET, now).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = b"{}";
        let then = 1_735_689_600;
        let header = sign(payload, SECRET, then);
        let err = verify_signature(payload, &header, SECRET, then + 600).unwrap_err();
        assert!(matches!(err, BillingError::InvalidSignature));
    }

    #[test]
    fn rejects_malformed_headers() {
        let payload = b"{}";
        for header in ["", "garbage", "v1=abcd", "t=1735689600", "t=abc,v1=00"] {
            assert!(
                verify_signature(payload, header, SECRET, 1_735_689_600).is_err(),
                "header {:?} should be rejected",
                header
            );
        }
    }

    #[test]
    fn extreme_timestamps_are_rejected_without_overflow() {
        let payload = b"{}";
        let now = 1_735_689_600;
        for t in [i64::MIN, i64::MAX, i64::MIN + 1] {
            let header = format!("t={},v1=00", t);
            let err = verify_signature(payload, &header, SECRET, now).unwrap_err();
            assert!(matches!(err, BillingError::InvalidSignature));
        }
        let header = sign(payload, SECRET, now);
        assert!(verify_signature(payload, &header, SECRET, i64::MIN).is_err());
        assert!(verify_signature(payload, &header, SECRET, i64::MAX).is_err());
    }
}
