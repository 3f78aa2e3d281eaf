use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::dto::{CheckoutRequest, CheckoutResponse, PlanView, SubscriptionView, WebhookAck};
use super::events::PaymentEvent;
use super::services::{self, Applied};
use super::{repo, stripe, BillingError};
use crate::{auth::jwt::AuthUser, auth::repo_types::User, state::AppState};

pub fn billing_routes() -> Router<AppState> {
    Router::new()
        .route("/billing/plans", get(list_plans))
        .route("/billing/checkout-session", post(create_checkout_session))
        .route("/billing/webhook", post(webhook))
}

pub fn me_subscription_routes() -> Router<AppState> {
    Router::new().route("/me/subscription", get(my_subscription))
}

#[instrument(skip(state))]
pub async fn list_plans(
    State(state): State<AppState>,
) -> Result<Json<Vec<PlanView>>, (StatusCode, String)> {
    let plans = repo::list_plans(&state.db).await.map_err(BillingError::from)?;
    Ok(Json(plans.into_iter().map(PlanView::from).collect()))
}

#[instrument(skip(state, payload), fields(user_id = %user_id))]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, (StatusCode, String)> {
    let plan_id = payload.plan_id.trim();
    if plan_id.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "plan_id is required".into()));
    }
    if repo::find_plan_by_external(&state.db, plan_id)
        .await
        .map_err(BillingError::from)?
        .is_none()
    {
        warn!(plan_id, "checkout for unknown plan");
        return Err(BillingError::NotFound(format!("plan {}", plan_id)).into());
    }

    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    let session = state
        .payments
        .create_checkout_session(plan_id, &user.email)
        .await?;
    info!(session_id = %session.id, plan_id, "checkout session started");
    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}

/// Receives provider events. Anything that needs no state change is
/// acknowledged so the provider stops redelivering it.
#[instrument(skip(state, headers, body))]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, (StatusCode, String)> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!("webhook without signature header");
            BillingError::InvalidSignature
        })?;
    stripe::verify_signature(
        &body,
        signature,
        &state.config.stripe.webhook_secret,
        OffsetDateTime::now_utc().unix_timestamp(),
    )
    .map_err(|e| {
        warn!("webhook signature rejected");
        e
    })?;

    let event = PaymentEvent::from_stripe_payload(&body)?;
    let outcome = services::process_event(&state.db, &event).await;
    let seen = state.webhook_stats.record(&outcome);

    match outcome {
        Ok(Applied::Created(_)) => Ok(Json(WebhookAck {
            received: true,
            outcome: "created",
        })),
        Ok(Applied::Updated(_)) => Ok(Json(WebhookAck {
            received: true,
            outcome: "updated",
        })),
        Err(e) if e.is_benign() => {
            info!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                reason = %e,
                seen,
                "webhook acknowledged without changes"
            );
            Ok(Json(WebhookAck {
                received: true,
                outcome: "ignored",
            }))
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(state), fields(user_id = %user_id))]
pub async fn my_subscription(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Option<SubscriptionView>>, (StatusCode, String)> {
    let now = OffsetDateTime::now_utc();
    let current = services::current_for_user(&state.db, user_id, now).await?;
    Ok(Json(
        current.map(|(sub, plan)| SubscriptionView::new(&sub, plan.as_ref(), now)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn webhook_without_signature_is_rejected() {
        let app = billing_routes().with_state(AppState::fake());
        let res = app
            .oneshot(
                Request::post("/billing/webhook")
                    .body(Body::from(r#"{"id":"evt_1","type":"x","data":{"object":{}}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_is_rejected() {
        let app = billing_routes().with_state(AppState::fake());
        let res = app
            .oneshot(
                Request::post("/billing/webhook")
                    .header("stripe-signature", "t=1,v1=00")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn checkout_requires_auth() {
        let app = billing_routes().with_state(AppState::fake());
        let res = app
            .oneshot(
                Request::post("/billing/checkout-session")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"plan_id":"price_1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
