mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use repo_types::{NutritionBasis, NutritionSummary, RecipeIngredientLine};
pub use services::NutritionResult;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NutritionError {
    #[error("invalid quantity {quantity} for ingredient {ingredient}")]
    InvalidQuantity { ingredient: String, quantity: f64 },
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::catalog_routes())
        .merge(handlers::recipe_nutrition_routes())
}
