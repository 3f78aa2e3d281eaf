use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, DeleteAccountRequest, LoginRequest, PublicUser, RefreshRequest, RegisterRequest},
        jwt::{AuthUser, JwtKeys},
        password::{hash_password, verify_password},
        repo_types::User,
        services::{issue_tokens, normalize_email, validate_registration},
    },
    error::AppError,
    recipes::services::discard_objects,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).delete(delete_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    payload.email = normalize_email(&payload.email);
    let name = validate_registration(&payload.name, &payload.email, &payload.password).map_err(|e| {
        warn!(email = %payload.email, reason = %e, "registration rejected");
        e
    })?;

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        AppError::from(e)
    })?;

    let user = match User::create(&state.db, name, &payload.email, &hash).await {
        Ok(u) => u,
        Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
            warn!(email = %payload.email, "email already registered");
            return Err((StatusCode::CONFLICT, "Email already registered".into()));
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err(AppError::from(e).into());
        }
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    let keys = JwtKeys::from_ref(&state);
    Ok((StatusCode::CREATED, Json(issue_tokens(&keys, user)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = normalize_email(&payload.email);

    let user = match User::find_by_email(&state.db, &payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %payload.email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(AppError::from(e).into());
        }
    };

    let ok = verify_password(&payload.password, &user.password_hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        AppError::from(e)
    })?;
    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }
    if user.disabled {
        warn!(user_id = %user.id, "login to disabled account");
        return Err((StatusCode::FORBIDDEN, "Account is disabled".into()));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    let keys = JwtKeys::from_ref(&state);
    Ok(Json(issue_tokens(&keys, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await
        .map_err(AppError::from)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;
    if user.disabled {
        return Err((StatusCode::FORBIDDEN, "Account is disabled".into()));
    }
    Ok(Json(issue_tokens(&keys, user)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| {
            warn!(user_id = %user_id, "user not found");
            (StatusCode::UNAUTHORIZED, "User not found".to_string())
        })?;
    Ok(Json(PublicUser::from(user)))
}

#[instrument(skip(state, payload))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<DeleteAccountRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(AppError::from)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash).map_err(AppError::from)? {
        warn!(user_id = %user_id, "account deletion with wrong password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }
    let keys = User::delete(&state.db, user_id).await.map_err(AppError::from)?;
    discard_objects(&state, &keys).await;
    info!(user_id = %user_id, images = keys.len(), "account deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .merge(auth_routes())
            .merge(me_routes())
            .with_state(AppState::fake())
    }

    async fn post_json(uri: &str, body: &str) -> StatusCode {
        app()
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn register_rejects_bad_input_before_touching_db() {
        let status = post_json(
            "/auth/register",
            r#"{"name":"Alice","email":"not-an-email","password":"longenough"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let status = post_json(
            "/auth/register",
            r#"{"name":"Alice","email":"alice@example.com","password":"short"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let keys = JwtKeys::from_ref(&AppState::fake());
        let access = keys.sign_access(uuid::Uuid::new_v4()).unwrap();
        let status = post_json("/auth/refresh", &format!(r#"{{"refresh_token":"{}"}}"#, access)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_requires_token() {
        let res = app()
            .oneshot(Request::get("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
