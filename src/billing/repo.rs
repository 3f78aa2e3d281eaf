use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::repo_types::{NewSubscription, Plan, Subscription, SubscriptionRow};
use super::services::SubscriptionLedger;
use super::BillingError;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, status, start_date, end_date, \
     stripe_subscription_id, stripe_customer_id";

pub async fn list_plans(db: &PgPool) -> Result<Vec<Plan>, sqlx::Error> {
    sqlx::query_as::<_, Plan>(
        r#"
        SELECT id, stripe_plan_id, name, price, interval
        FROM stripe_plans
        ORDER BY price ASC, name ASC
        "#,
    )
    .fetch_all(db)
    .await
}

pub async fn find_plan(db: &PgPool, plan_id: Uuid) -> Result<Option<Plan>, sqlx::Error> {
    sqlx::query_as::<_, Plan>(
        r#"SELECT id, stripe_plan_id, name, price, interval FROM stripe_plans WHERE id = $1"#,
    )
    .bind(plan_id)
    .fetch_optional(db)
    .await
}

pub async fn find_plan_by_external(db: &PgPool, stripe_plan_id: &str) -> Result<Option<Plan>, sqlx::Error> {
    sqlx::query_as::<_, Plan>(
        r#"SELECT id, stripe_plan_id, name, price, interval FROM stripe_plans WHERE stripe_plan_id = $1"#,
    )
    .bind(stripe_plan_id)
    .fetch_optional(db)
    .await
}

/// All subscriptions of a user, oldest first.
pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> Result<Vec<Subscription>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
        "SELECT {} FROM subscriptions WHERE user_id = $1 ORDER BY start_date ASC, id ASC",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(Subscription::try_from).collect()
}

#[async_trait]
impl<'c> SubscriptionLedger for Transaction<'c, Postgres> {
    async fn find_for_update(&mut self, external_id: &str) -> Result<Option<Subscription>, BillingError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions WHERE stripe_subscription_id = $1 FOR UPDATE",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&mut **self)
        .await?;
        Ok(row.map(Subscription::try_from).transpose()?)
    }

    async fn user_id_by_email(&mut self, email: &str) -> Result<Option<Uuid>, BillingError> {
        let id = sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM users WHERE email = $1"#)
            .bind(email)
            .fetch_optional(&mut **self)
            .await?;
        Ok(id)
    }

    async fn plan_id_by_external(&mut self, stripe_plan_id: &str) -> Result<Option<Uuid>, BillingError> {
        let id = sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM stripe_plans WHERE stripe_plan_id = $1"#)
            .bind(stripe_plan_id)
            .fetch_optional(&mut **self)
            .await?;
        Ok(id)
    }

    async fn insert_if_absent(&mut self, new: &NewSubscription) -> Result<Option<Subscription>, BillingError> {
        let sub = Subscription::provision(Uuid::new_v4(), new);
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO subscriptions
                (id, user_id, plan_id, status, start_date, end_date, stripe_subscription_id, stripe_customer_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (stripe_subscription_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(sub.id)
        .bind(sub.user_id)
        .bind(sub.plan_id)
        .bind(sub.status.as_str())
        .bind(sub.start_date)
        .bind(sub.end_date)
        .bind(&sub.stripe_subscription_id)
        .bind(&sub.stripe_customer_id)
        .fetch_optional(&mut **self)
        .await?;
        Ok(inserted.map(|_| sub))
    }

    async fn save_state(&mut self, sub: &Subscription) -> Result<(), BillingError> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2, end_date = $3
            WHERE id = $1
            "#,
        )
        .bind(sub.id)
        .bind(sub.status.as_str())
        .bind(sub.end_date)
        .execute(&mut **self)
        .await?;
        Ok(())
    }
}
