use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{CreateRecipeRequest, ImageView, RecipeDetail, RecipeListItem};
use super::services;
use crate::{auth::jwt::AuthUser, auth::services::ensure_enabled, state::AppState};

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route("/recipes/:id", get(get_recipe).delete(delete_recipe))
        .route("/recipes/:id/images", post(regenerate_image))
}

#[instrument(skip(state, body))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<RecipeDetail>), (StatusCode, String)> {
    services::validate_title(&body.title)?;
    ensure_enabled(&state.db, user_id).await?;
    let detail = services::create_recipe(&state, user_id, &body.title).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<RecipeListItem>>, (StatusCode, String)> {
    Ok(Json(services::list_recipes(&state, user_id).await?))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(recipe_id): Path<Uuid>,
) -> Result<Json<RecipeDetail>, (StatusCode, String)> {
    Ok(Json(services::recipe_detail(&state, user_id, recipe_id).await?))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(recipe_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    services::delete_recipe(&state, user_id, recipe_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn regenerate_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(recipe_id): Path<Uuid>,
) -> Result<(StatusCode, Json<ImageView>), (StatusCode, String)> {
    ensure_enabled(&state.db, user_id).await?;
    let image = services::regenerate_image(&state, user_id, recipe_id).await?;
    Ok((StatusCode::CREATED, Json(image)))
}
