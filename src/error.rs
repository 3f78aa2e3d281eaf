use axum::http::StatusCode;
use tracing::error;

use crate::generation::GenerationError;
use crate::nutrition::NutritionError;

/// Errors surfaced by the recipe, catalog and account handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Nutrition(#[from] NutritionError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Nutrition(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Generation(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AppError> for (StatusCode, String) {
    fn from(e: AppError) -> Self {
        let status = e.status();
        if status.is_server_error() {
            error!(error = %e, %status, "request failed");
        }
        (status, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_kinds_to_status_codes() {
        assert_eq!(
            AppError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound("recipe").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Forbidden("disabled".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Generation(GenerationError::EmptyResponse).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn tuple_conversion_keeps_message() {
        let (status, msg): (StatusCode, String) = AppError::NotFound("recipe").into();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(msg, "recipe not found");
    }
}
