use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;

use super::BillingError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventKind {
    CheckoutCompleted,
    SubscriptionChanged,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    Other(String),
}

impl PaymentEventKind {
    pub fn from_type(t: &str) -> Self {
        match t {
            "checkout.session.completed" => PaymentEventKind::CheckoutCompleted,
            "customer.subscription.created"
            | "customer.subscription.updated"
            | "customer.subscription.deleted" => PaymentEventKind::SubscriptionChanged,
            "invoice.payment_succeeded" => PaymentEventKind::InvoicePaymentSucceeded,
            "invoice.payment_failed" => PaymentEventKind::InvoicePaymentFailed,
            other => PaymentEventKind::Other(other.to_string()),
        }
    }
}

/// Provider-neutral view of a verified webhook delivery.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub event_id: String,
    pub event_type: String,
    pub kind: PaymentEventKind,
    pub external_subscription_id: Option<String>,
    pub external_customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub reported_status: Option<String>,
    pub metadata: HashMap<String, String>,
    pub occurred_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
struct StripeEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: Option<i64>,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Value,
}

fn str_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl PaymentEvent {
    /// Decodes a Stripe event body. The signature must already be verified.
    pub fn from_stripe_payload(payload: &[u8]) -> Result<Self, BillingError> {
        let env: StripeEnvelope = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;
        let obj = &env.data.object;
        let kind = PaymentEventKind::from_type(&env.event_type);

        // subscription objects carry their own id; sessions and invoices reference one
        let external_subscription_id = match kind {
            PaymentEventKind::SubscriptionChanged => str_field(obj, "id"),
            _ => str_field(obj, "subscription"),
        };
        let customer_email = str_field(obj, "customer_email").or_else(|| {
            obj.get("customer_details")
                .and_then(|d| str_field(d, "email"))
        });
        let metadata = obj
            .get("metadata")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let occurred_at = env
            .created
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
            .unwrap_or_else(OffsetDateTime::now_utc);

        Ok(Self {
            event_id: env.id,
            event_type: env.event_type,
            kind,
            external_subscription_id,
            external_customer_id: str_field(obj, "customer"),
            customer_email,
            reported_status: str_field(obj, "status"),
            metadata,
            occurred_at,
        })
    }
}
