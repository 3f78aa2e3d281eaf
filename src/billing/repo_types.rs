use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Unpaid,
    PastDue,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::PastDue => "past_due",
        }
    }

    /// Statuses that stop renewal and stamp an end date when reported by a lifecycle event.
    pub fn ends_billing(self) -> bool {
        !matches!(self, SubscriptionStatus::Active)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "canceled" | "cancelled" => Ok(SubscriptionStatus::Canceled),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            other => Err(format!("unsupported subscription status: {}", other)),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingInterval {
    Month,
    Year,
    Other(String),
}

impl BillingInterval {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "month" | "monthly" => BillingInterval::Month,
            "year" | "yearly" | "annual" => BillingInterval::Year,
            other => BillingInterval::Other(other.to_string()),
        }
    }
}

/// Stripe price the user can subscribe to.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub stripe_plan_id: String,
    pub name: String,
    pub price: f64,
    pub interval: String,
}

impl Plan {
    pub fn billing_interval(&self) -> BillingInterval {
        BillingInterval::parse(&self.interval)
    }

    /// e.g. `$10 / month`
    pub fn display_price(&self) -> String {
        format!("${} / {}", self.price, self.interval)
    }

    /// Yearly prices are spread over twelve months and rounded to cents.
    pub fn monthly_price(&self) -> f64 {
        match self.billing_interval() {
            BillingInterval::Year => (self.price / 12.0 * 100.0).round() / 100.0,
            _ => self.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub start_date: OffsetDateTime,
    pub end_date: Option<OffsetDateTime>,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: String,
    pub start_date: OffsetDateTime,
    pub end_date: Option<OffsetDateTime>,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: Option<String>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = sqlx::Error;

    fn try_from(r: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = r
            .status
            .parse::<SubscriptionStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            plan_id: r.plan_id,
            status,
            start_date: r.start_date,
            end_date: r.end_date,
            stripe_subscription_id: r.stripe_subscription_id,
            stripe_customer_id: r.stripe_customer_id,
        })
    }
}

/// Values for a subscription provisioned by a completed checkout.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub start_date: OffsetDateTime,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: Option<String>,
}
