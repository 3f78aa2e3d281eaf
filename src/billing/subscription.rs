//! Subscription lifecycle: status transitions and expiry-derived queries.
//!
//! Transitions are keyed by the provider's subscription id only. Replays are
//! harmless, but two conflicting events delivered out of order leave the
//! subscription in whatever state the last processed one reported.

use time::OffsetDateTime;

use super::repo_types::{NewSubscription, Subscription, SubscriptionStatus};

impl Subscription {
    pub fn provision(id: uuid::Uuid, new: &NewSubscription) -> Self {
        Self {
            id,
            user_id: new.user_id,
            plan_id: new.plan_id,
            status: SubscriptionStatus::Active,
            start_date: new.start_date,
            end_date: None,
            stripe_subscription_id: new.stripe_subscription_id.clone(),
            stripe_customer_id: new.stripe_customer_id.clone(),
        }
    }

    /// Active status and not yet past its end date.
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date.map_or(true, |end| end > now)
    }

    /// Whole days until `end_date`, floored at zero. `None` while still billed.
    pub fn days_remaining(&self, now: OffsetDateTime) -> Option<i64> {
        self.end_date.map(|end| (end - now).whole_days().max(0))
    }

    /// Status reported by a `customer.subscription.*` event.
    pub fn apply_reported_status(&mut self, status: SubscriptionStatus, at: OffsetDateTime) {
        self.status = status;
        if status.ends_billing() {
            self.end_date = Some(at);
        }
    }

    /// Outcome of an invoice payment. The end date is left untouched.
    pub fn apply_invoice_outcome(&mut self, paid: bool) {
        self.status = if paid {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::PastDue
        };
    }
}

/// First subscription in iteration order that is currently active.
pub fn current_subscription(subs: &[Subscription], now: OffsetDateTime) -> Option<&Subscription> {
    subs.iter().find(|s| s.is_active(now))
}
