use serde::Deserialize;
use uuid::Uuid;

use super::repo_types::{NutritionBasis, NutritionFacts};

#[derive(Debug, Deserialize)]
pub struct CreateIngredientRequest {
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub basis: NutritionBasis,
    #[serde(flatten)]
    pub facts: NutritionFacts,
}

#[derive(Debug, Deserialize)]
pub struct AddLineRequest {
    pub ingredient_id: Uuid,
    pub quantity: f64,
}
