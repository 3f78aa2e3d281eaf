use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::events::{PaymentEvent, PaymentEventKind};
use super::repo;
use super::repo_types::{NewSubscription, Plan, Subscription, SubscriptionStatus};
use super::subscription::current_subscription;
use super::BillingError;

/// Storage operations the subscription state machine needs.
///
/// The Postgres implementation runs on a transaction: lookups lock the row and
/// inserts rely on the unique external id, so concurrent deliveries serialize.
#[async_trait]
pub trait SubscriptionLedger: Send {
    async fn find_for_update(&mut self, external_id: &str) -> Result<Option<Subscription>, BillingError>;
    async fn user_id_by_email(&mut self, email: &str) -> Result<Option<Uuid>, BillingError>;
    async fn plan_id_by_external(&mut self, stripe_plan_id: &str) -> Result<Option<Uuid>, BillingError>;
    /// `None` when a row for the external id already exists.
    async fn insert_if_absent(&mut self, new: &NewSubscription) -> Result<Option<Subscription>, BillingError>;
    async fn save_state(&mut self, sub: &Subscription) -> Result<(), BillingError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Created(Subscription),
    Updated(Subscription),
}

fn required<'a>(v: &'a Option<String>, field: &'static str) -> Result<&'a str, BillingError> {
    v.as_deref().ok_or(BillingError::MissingField(field))
}

/// Applies one payment event. Benign outcomes (duplicate, unknown subscription,
/// unhandled type) come back as errors for which [`BillingError::is_benign`] holds.
pub async fn apply_event<L>(ledger: &mut L, event: &PaymentEvent) -> Result<Applied, BillingError>
where
    L: SubscriptionLedger + ?Sized,
{
    match &event.kind {
        PaymentEventKind::CheckoutCompleted => {
            let external_id = required(&event.external_subscription_id, "subscription")?;
            if ledger.find_for_update(external_id).await?.is_some() {
                return Err(BillingError::DuplicateEvent(external_id.to_string()));
            }
            let email = required(&event.customer_email, "customer_email")?;
            let plan_ref = event
                .metadata
                .get("plan_id")
                .map(String::as_str)
                .ok_or(BillingError::MissingField("metadata.plan_id"))?;

            let user_id = ledger
                .user_id_by_email(&email.trim().to_lowercase())
                .await?
                .ok_or_else(|| BillingError::NotFound(format!("user {}", email)))?;
            let plan_id = ledger
                .plan_id_by_external(plan_ref)
                .await?
                .ok_or_else(|| BillingError::NotFound(format!("plan {}", plan_ref)))?;

            let new = NewSubscription {
                user_id,
                plan_id,
                start_date: event.occurred_at,
                stripe_subscription_id: external_id.to_string(),
                stripe_customer_id: event.external_customer_id.clone(),
            };
            match ledger.insert_if_absent(&new).await? {
                Some(sub) => Ok(Applied::Created(sub)),
                None => Err(BillingError::DuplicateEvent(external_id.to_string())),
            }
        }
        PaymentEventKind::SubscriptionChanged => {
            let external_id = required(&event.external_subscription_id, "id")?;
            let reported = required(&event.reported_status, "status")?;
            let mut sub = ledger
                .find_for_update(external_id)
                .await?
                .ok_or_else(|| BillingError::NotFound(format!("subscription {}", external_id)))?;
            let status = reported
                .parse::<SubscriptionStatus>()
                .map_err(|_| BillingError::UnsupportedStatus(reported.to_string()))?;
            sub.apply_reported_status(status, event.occurred_at);
            ledger.save_state(&sub).await?;
            Ok(Applied::Updated(sub))
        }
        PaymentEventKind::InvoicePaymentSucceeded | PaymentEventKind::InvoicePaymentFailed => {
            let external_id = required(&event.external_subscription_id, "subscription")?;
            let mut sub = ledger
                .find_for_update(external_id)
                .await?
                .ok_or_else(|| BillingError::NotFound(format!("subscription {}", external_id)))?;
            sub.apply_invoice_outcome(event.kind == PaymentEventKind::InvoicePaymentSucceeded);
            ledger.save_state(&sub).await?;
            Ok(Applied::Updated(sub))
        }
        PaymentEventKind::Other(t) => Err(BillingError::UnhandledEvent(t.clone())),
    }
}

/// Counters for webhook deliveries that needed no state change.
#[derive(Debug, Default)]
pub struct WebhookStats {
    pub applied: AtomicU64,
    pub duplicates: AtomicU64,
    pub not_found: AtomicU64,
    pub ignored: AtomicU64,
}

impl WebhookStats {
    pub fn record(&self, outcome: &Result<Applied, BillingError>) -> u64 {
        let counter = match outcome {
            Ok(_) => &self.applied,
            Err(BillingError::DuplicateEvent(_)) => &self.duplicates,
            Err(BillingError::NotFound(_)) => &self.not_found,
            Err(e) if e.is_benign() => &self.ignored,
            Err(_) => return 0,
        };
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Verified event in, one transaction out.
#[instrument(skip(db, event), fields(event_id = %event.event_id, event_type = %event.event_type))]
pub async fn process_event(db: &PgPool, event: &PaymentEvent) -> Result<Applied, BillingError> {
    let mut tx = db.begin().await?;
    let applied = apply_event(&mut tx, event).await?;
    tx.commit().await?;
    match &applied {
        Applied::Created(s) => info!(
            subscription_id = %s.id,
            user_id = %s.user_id,
            external_id = %s.stripe_subscription_id,
            "subscription created"
        ),
        Applied::Updated(s) => info!(
            subscription_id = %s.id,
            external_id = %s.stripe_subscription_id,
            status = %s.status,
            "subscription updated"
        ),
    }
    Ok(applied)
}

/// The user's currently active subscription together with its plan.
pub async fn current_for_user(
    db: &PgPool,
    user_id: Uuid,
    now: OffsetDateTime,
) -> Result<Option<(Subscription, Option<Plan>)>, BillingError> {
    let subs = repo::list_by_user(db, user_id).await?;
    let Some(current) = current_subscription(&subs, now).cloned() else {
        return Ok(None);
    };
    let plan = repo::find_plan(db, current.plan_id).await?;
    if plan.is_none() {
        warn!(plan_id = %current.plan_id, "subscription references a missing plan");
    }
    Ok(Some((current, plan)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use time::macros::datetime;

    /// In-memory ledger with the same uniqueness rule as the table.
    #[derive(Default)]
    struct MemoryLedger {
        users: HashMap<String, Uuid>,
        plans: HashMap<String, Uuid>,
        subs: Vec<Subscription>,
    }

    #[async_trait]
    impl SubscriptionLedger for MemoryLedger {
        async fn find_for_update(&mut self, external_id: &str) -> Result<Option<Subscription>, BillingError> {
            Ok(self
                .subs
                .iter()
                .find(|s| s.stripe_subscription_id == external_id)
                .cloned())
        }
        async fn user_id_by_email(&mut self, email: &str) -> Result<Option<Uuid>, BillingError> {
            Ok(self.users.get(email).copied())
        }
        async fn plan_id_by_external(&mut self, stripe_plan_id: &str) -> Result<Option<Uuid>, BillingError> {
            Ok(self.plans.get(stripe_plan_id).copied())
        }
        async fn insert_if_absent(&mut self, new: &NewSubscription) -> Result<Option<Subscription>, BillingError> {
            if self
                .subs
                .iter()
                .any(|s| s.stripe_subscription_id == new.stripe_subscription_id)
            {
                return Ok(None);
            }
            let sub = Subscription::provision(Uuid::new_v4(), new);
            self.subs.push(sub.clone());
            Ok(Some(sub))
        }
        async fn save_state(&mut self, sub: &Subscription) -> Result<(), BillingError> {
            if let Some(s) = self.subs.iter_mut().find(|s| s.id == sub.id) {
                *s = sub.clone();
            }
            Ok(())
        }
    }

    fn ledger() -> MemoryLedger {
        let mut l = MemoryLedger::default();
        l.users.insert("alice@example.com".into(), Uuid::new_v4());
        l.plans.insert("price_basic".into(), Uuid::new_v4());
        l
    }

    fn event(kind: PaymentEventKind, external: &str) -> PaymentEvent {
        PaymentEvent {
            event_id: "evt_test".into(),
            event_type: "test".into(),
            kind,
            external_subscription_id: Some(external.into()),
            external_customer_id: Some("cus_1".into()),
            customer_email: None,
            reported_status: None,
            metadata: HashMap::new(),
            occurred_at: datetime!(2025-01-01 00:00 UTC),
        }
    }

    fn checkout(external: &str) -> PaymentEvent {
        let mut e = event(PaymentEventKind::CheckoutCompleted, external);
        e.customer_email = Some("Alice@Example.com".into());
        e.metadata.insert("plan_id".into(), "price_basic".into());
        e
    }

    fn lifecycle(external: &str, status: &str, at: OffsetDateTime) -> PaymentEvent {
        let mut e = event(PaymentEventKind::SubscriptionChanged, external);
        e.reported_status = Some(status.into());
        e.occurred_at = at;
        e
    }

    #[tokio::test]
    async fn checkout_creates_active_subscription() {
        let mut l = ledger();
        let applied = apply_event(&mut l, &checkout("sub_1")).await.unwrap();
        let Applied::Created(sub) = applied else {
            panic!("expected creation");
        };
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.start_date, datetime!(2025-01-01 00:00 UTC));
        assert_eq!(sub.end_date, None);
        assert_eq!(sub.user_id, l.users["alice@example.com"]);
        assert_eq!(sub.plan_id, l.plans["price_basic"]);
        assert_eq!(sub.stripe_customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn duplicate_checkouts_leave_one_row() {
        let mut l = ledger();
        let stats = WebhookStats::default();
        for _ in 0..5 {
            let outcome = apply_event(&mut l, &checkout("sub_1")).await;
            stats.record(&outcome);
        }
        assert_eq!(l.subs.len(), 1);
        assert_eq!(stats.applied.load(Ordering::Relaxed), 1);
        assert_eq!(stats.duplicates.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn checkout_for_unknown_user_or_plan_is_benign() {
        let mut l = ledger();
        let mut e = checkout("sub_1");
        e.customer_email = Some("nobody@example.com".into());
        let err = apply_event(&mut l, &e).await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound(_)) && err.is_benign());

        let mut e = checkout("sub_1");
        e.metadata.insert("plan_id".into(), "price_missing".into());
        let err = apply_event(&mut l, &e).await.unwrap_err();
        assert!(err.is_benign());
        assert!(l.subs.is_empty());
    }

    #[tokio::test]
    async fn checkout_missing_fields_is_benign() {
        let mut l = ledger();
        let mut e = checkout("sub_1");
        e.metadata.clear();
        let err = apply_event(&mut l, &e).await.unwrap_err();
        assert!(matches!(err, BillingError::MissingField("metadata.plan_id")));
        assert!(err.is_benign());
    }

    #[tokio::test]
    async fn unknown_subscription_changes_nothing() {
        let mut l = ledger();
        apply_event(&mut l, &checkout("sub_1")).await.unwrap();
        let before = l.subs.clone();

        let at = datetime!(2025-02-01 00:00 UTC);
        for e in [
            lifecycle("sub_other", "canceled", at),
            event(PaymentEventKind::InvoicePaymentFailed, "sub_other"),
            event(PaymentEventKind::InvoicePaymentSucceeded, "sub_other"),
        ] {
            let err = apply_event(&mut l, &e).await.unwrap_err();
            assert!(matches!(err, BillingError::NotFound(_)));
            assert!(err.is_benign());
        }
        assert_eq!(l.subs, before);
    }

    #[tokio::test]
    async fn lifecycle_events_drive_status_and_end_date() {
        let mut l = ledger();
        apply_event(&mut l, &checkout("sub_1")).await.unwrap();

        let canceled_at = datetime!(2025-03-01 10:00 UTC);
        apply_event(&mut l, &lifecycle("sub_1", "canceled", canceled_at))
            .await
            .unwrap();
        assert_eq!(l.subs[0].status, SubscriptionStatus::Canceled);
        assert_eq!(l.subs[0].end_date, Some(canceled_at));

        // re-activation keeps the previous end date
        apply_event(&mut l, &lifecycle("sub_1", "active", datetime!(2025-03-02 10:00 UTC)))
            .await
            .unwrap();
        assert_eq!(l.subs[0].status, SubscriptionStatus::Active);
        assert_eq!(l.subs[0].end_date, Some(canceled_at));
    }

    #[tokio::test]
    async fn invoice_events_toggle_active_and_past_due() {
        let mut l = ledger();
        apply_event(&mut l, &checkout("sub_1")).await.unwrap();

        apply_event(&mut l, &event(PaymentEventKind::InvoicePaymentFailed, "sub_1"))
            .await
            .unwrap();
        assert_eq!(l.subs[0].status, SubscriptionStatus::PastDue);
        assert_eq!(l.subs[0].end_date, None);

        apply_event(&mut l, &event(PaymentEventKind::InvoicePaymentSucceeded, "sub_1"))
            .await
            .unwrap();
        assert_eq!(l.subs[0].status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn unsupported_status_and_event_type_are_benign() {
        let mut l = ledger();
        apply_event(&mut l, &checkout("sub_1")).await.unwrap();

        let err = apply_event(&mut l, &lifecycle("sub_1", "trialing", datetime!(2025-03-01 0:00 UTC)))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::UnsupportedStatus(_)) && err.is_benign());
        assert_eq!(l.subs[0].status, SubscriptionStatus::Active);

        let err = apply_event(&mut l, &event(PaymentEventKind::Other("charge.refunded".into()), "sub_1"))
            .await
            .unwrap_err();
        assert!(err.is_benign());
    }

    #[tokio::test]
    async fn last_processed_event_wins() {
        let mut l = ledger();
        apply_event(&mut l, &checkout("sub_1")).await.unwrap();
        // chronologically later cancel processed before an older "active"
        apply_event(&mut l, &lifecycle("sub_1", "canceled", datetime!(2025-05-01 0:00 UTC)))
            .await
            .unwrap();
        apply_event(&mut l, &lifecycle("sub_1", "active", datetime!(2025-04-01 0:00 UTC)))
            .await
            .unwrap();
        assert_eq!(l.subs[0].status, SubscriptionStatus::Active);
    }
}
