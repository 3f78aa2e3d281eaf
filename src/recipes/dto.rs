use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Image, Recipe, Step};
use crate::nutrition::{NutritionResult, NutritionSummary, RecipeIngredientLine};

#[derive(Debug, Deserialize)]
pub struct CreateRecipeRequest {
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ImageView {
    pub id: Uuid,
    /// Presigned link to the mirrored copy, or the generator URL.
    pub url: String,
    pub image_url: String,
    pub filename: String,
    pub is_regenerated: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ImageView {
    pub fn new(image: Image, url: String) -> Self {
        Self {
            id: image.id,
            filename: image.filename().to_string(),
            url,
            image_url: image.image_url,
            is_regenerated: image.is_regenerated,
            created_at: image.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StepView {
    pub step_number: i32,
    pub instruction: String,
    pub summary: String,
}

const STEP_SUMMARY_CHARS: usize = 40;

impl From<Step> for StepView {
    fn from(s: Step) -> Self {
        Self {
            summary: s.short_instruction(STEP_SUMMARY_CHARS),
            step_number: s.step_number,
            instruction: s.instruction,
        }
    }
}

/// Ingredient line with what it adds to the recipe.
#[derive(Debug, Serialize)]
pub struct LineView {
    #[serde(flatten)]
    pub line: RecipeIngredientLine,
    pub contribution: NutritionSummary,
}

impl From<RecipeIngredientLine> for LineView {
    fn from(line: RecipeIngredientLine) -> Self {
        Self {
            contribution: line.contribution(),
            line,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    #[serde(serialize_with = "steps_as_views")]
    pub steps: Vec<Step>,
    pub images: Vec<ImageView>,
    pub ingredients: Vec<LineView>,
    pub nutrition: NutritionResult,
}

fn steps_as_views<S: serde::Serializer>(steps: &[Step], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(steps.iter().cloned().map(StepView::from))
}

#[derive(Debug, Serialize)]
pub struct RecipeListItem {
    pub id: Uuid,
    pub title: String,
    pub markdown_content: String,
    pub nutrition_satisfied: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub images: Vec<ImageView>,
}

impl RecipeListItem {
    pub fn new(recipe: Recipe, images: Vec<ImageView>) -> Self {
        Self {
            id: recipe.id,
            title: recipe.title,
            markdown_content: recipe.markdown_content,
            nutrition_satisfied: recipe.nutrition_satisfied,
            created_at: recipe.created_at,
            images,
        }
    }
}
