use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Plan, Subscription, SubscriptionStatus};

#[derive(Debug, Serialize)]
pub struct PlanView {
    pub id: Uuid,
    pub stripe_plan_id: String,
    pub name: String,
    pub price: f64,
    pub interval: String,
    pub display_price: String,
    pub monthly_price: f64,
}

impl From<Plan> for PlanView {
    fn from(p: Plan) -> Self {
        Self {
            display_price: p.display_price(),
            monthly_price: p.monthly_price(),
            id: p.id,
            stripe_plan_id: p.stripe_plan_id,
            name: p.name,
            price: p.price,
            interval: p.interval,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Provider price id, e.g. `price_123`.
    pub plan_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub plan_name: Option<String>,
    pub status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub is_active: bool,
    pub days_remaining: Option<i64>,
}

impl SubscriptionView {
    pub fn new(sub: &Subscription, plan: Option<&Plan>, now: OffsetDateTime) -> Self {
        Self {
            id: sub.id,
            plan_id: sub.plan_id,
            plan_name: plan.map(|p| p.name.clone()),
            status: sub.status,
            start_date: sub.start_date,
            end_date: sub.end_date,
            is_active: sub.is_active(now),
            days_remaining: sub.days_remaining(now),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn plan(price: f64, interval: &str) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            stripe_plan_id: "price_1".into(),
            name: "Pro".into(),
            price,
            interval: interval.into(),
        }
    }

    #[test]
    fn yearly_plan_is_spread_over_months() {
        let view = PlanView::from(plan(120.0, "year"));
        assert_eq!(view.monthly_price, 10.0);
        assert_eq!(view.display_price, "$120 / year");

        let view = PlanView::from(plan(100.0, "year"));
        assert_eq!(view.monthly_price, 8.33);
    }

    #[test]
    fn monthly_plan_is_unchanged() {
        let view = PlanView::from(plan(9.99, "month"));
        assert_eq!(view.monthly_price, 9.99);
        assert_eq!(view.display_price, "$9.99 / month");
    }

    #[test]
    fn subscription_view_serializes_derived_fields() {
        let sub = Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            status: SubscriptionStatus::PastDue,
            start_date: datetime!(2025-01-01 00:00 UTC),
            end_date: Some(datetime!(2025-02-01 00:00 UTC)),
            stripe_subscription_id: "sub_1".into(),
            stripe_customer_id: None,
        };
        let p = plan(10.0, "month");
        let view = SubscriptionView::new(&sub, Some(&p), datetime!(2025-01-20 00:00 UTC));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "past_due");
        assert_eq!(json["is_active"], false);
        assert_eq!(json["days_remaining"], 12);
        assert_eq!(json["plan_name"], "Pro");
        assert_eq!(json["start_date"], "2025-01-01T00:00:00Z");
    }
}
