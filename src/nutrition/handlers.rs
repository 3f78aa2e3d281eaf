use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{AddLineRequest, CreateIngredientRequest};
use super::repo;
use super::repo_types::{Ingredient, RecipeIngredientLine};
use super::services::{self, NutritionResult};
use crate::{auth::jwt::AuthUser, error::AppError, state::AppState};

pub fn catalog_routes() -> Router<AppState> {
    Router::new().route("/ingredients", get(list_ingredients).post(create_ingredient))
}

pub fn recipe_nutrition_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes/:id/ingredients", post(add_line))
        .route(
            "/recipes/:id/nutrition",
            get(get_nutrition).post(recompute_nutrition),
        )
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
) -> Result<Json<Vec<Ingredient>>, (StatusCode, String)> {
    let items = repo::list_ingredients(&state.db)
        .await
        .map_err(AppError::from)?;
    Ok(Json(items))
}

#[instrument(skip(state, body))]
pub async fn create_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateIngredientRequest>,
) -> Result<(StatusCode, Json<Ingredient>), (StatusCode, String)> {
    let name = body.name.trim();
    if name.is_empty() || body.unit.trim().is_empty() {
        return Err(AppError::Validation("name and unit are required".into()).into());
    }
    let f = &body.facts;
    let negative = [f.calories, f.protein, f.fat, f.carbohydrates, f.fiber, f.salt]
        .into_iter()
        .flatten()
        .any(|v| !v.is_finite() || v < 0.0);
    if negative {
        return Err(AppError::Validation("nutrition facts must be non-negative".into()).into());
    }

    let ingredient = repo::insert_ingredient(&state.db, name, body.unit.trim(), body.basis, f)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
                warn!(name, "ingredient already exists");
                AppError::Conflict(format!("ingredient {} already exists", name))
            } else {
                AppError::from(e)
            }
        })?;

    info!(%user_id, ingredient_id = %ingredient.id, name = %ingredient.name, "ingredient created");
    Ok((StatusCode::CREATED, Json(ingredient)))
}

#[instrument(skip(state, body))]
pub async fn add_line(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(recipe_id): Path<Uuid>,
    Json(body): Json<AddLineRequest>,
) -> Result<(StatusCode, Json<RecipeIngredientLine>), (StatusCode, String)> {
    let line = services::add_ingredient_line(
        &state.db,
        user_id,
        recipe_id,
        body.ingredient_id,
        body.quantity,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

#[instrument(skip(state))]
pub async fn recompute_nutrition(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(recipe_id): Path<Uuid>,
) -> Result<Json<NutritionResult>, (StatusCode, String)> {
    let result = services::recompute_recipe_nutrition(&state.db, user_id, recipe_id).await?;
    Ok(Json(result))
}

#[instrument(skip(state))]
pub async fn get_nutrition(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(recipe_id): Path<Uuid>,
) -> Result<Json<NutritionResult>, (StatusCode, String)> {
    let result = services::recipe_nutrition(&state.db, user_id, recipe_id).await?;
    Ok(Json(result))
}
