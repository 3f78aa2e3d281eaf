use axum::{http::StatusCode, Router};
use tracing::error;

use crate::state::AppState;

mod dto;
pub mod events;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod stripe;
pub mod subscription;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
    #[error("event is missing {0}")]
    MissingField(&'static str),
    #[error("{0} not found")]
    NotFound(String),
    #[error("subscription {0} already recorded")]
    DuplicateEvent(String),
    #[error("unsupported subscription status {0}")]
    UnsupportedStatus(String),
    #[error("unhandled event type {0}")]
    UnhandledEvent(String),
    #[error("payment provider error: {0}")]
    Gateway(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BillingError {
    /// Outcomes a webhook acknowledges with 200 so the provider stops retrying.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            BillingError::MissingField(_)
                | BillingError::NotFound(_)
                | BillingError::DuplicateEvent(_)
                | BillingError::UnsupportedStatus(_)
                | BillingError::UnhandledEvent(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BillingError::InvalidSignature
            | BillingError::InvalidPayload(_)
            | BillingError::MissingField(_)
            | BillingError::UnsupportedStatus(_)
            | BillingError::UnhandledEvent(_) => StatusCode::BAD_REQUEST,
            BillingError::NotFound(_) => StatusCode::NOT_FOUND,
            BillingError::DuplicateEvent(_) => StatusCode::CONFLICT,
            BillingError::Gateway(_) => StatusCode::BAD_GATEWAY,
            BillingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BillingError> for (StatusCode, String) {
    fn from(e: BillingError) -> Self {
        let status = e.status();
        if status.is_server_error() {
            error!(error = %e, %status, "billing request failed");
        }
        (status, e.to_string())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::billing_routes())
        .merge(handlers::me_subscription_routes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_outcomes() {
        assert!(BillingError::DuplicateEvent("sub_1".into()).is_benign());
        assert!(BillingError::NotFound("subscription sub_1".into()).is_benign());
        assert!(BillingError::UnhandledEvent("charge.refunded".into()).is_benign());
        assert!(BillingError::MissingField("customer_email").is_benign());
        assert!(!BillingError::InvalidSignature.is_benign());
        assert!(!BillingError::InvalidPayload("eof".into()).is_benign());
        assert!(!BillingError::Database(sqlx::Error::PoolTimedOut).is_benign());
    }

    #[test]
    fn status_codes() {
        assert_eq!(BillingError::InvalidSignature.status(), StatusCode::BAD_REQUEST);
        assert_eq!(BillingError::Gateway("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            BillingError::Database(sqlx::Error::PoolTimedOut).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let (status, msg): (StatusCode, String) = BillingError::NotFound("price p_1".into()).into();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(msg, "price p_1 not found");
    }
}
