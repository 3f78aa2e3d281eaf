use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How an ingredient's facts are expressed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum NutritionBasis {
    /// Facts are per 100 units (100 g, 100 ml, ...).
    #[default]
    #[serde(rename = "per_100")]
    Per100,
    /// Facts are per single unit (one egg, one slice, ...).
    #[serde(rename = "per_unit")]
    PerUnit,
}

impl NutritionBasis {
    pub fn as_str(self) -> &'static str {
        match self {
            NutritionBasis::Per100 => "per_100",
            NutritionBasis::PerUnit => "per_unit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "per_100" => Some(NutritionBasis::Per100),
            "per_unit" => Some(NutritionBasis::PerUnit),
            _ => None,
        }
    }

    /// Multiplier applied to the facts for `quantity` units.
    pub fn factor(self, quantity: f64) -> f64 {
        match self {
            NutritionBasis::Per100 => quantity / 100.0,
            NutritionBasis::PerUnit => quantity,
        }
    }
}

/// Nutritional facts of one ingredient. Missing values count as zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NutritionFacts {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carbohydrates: Option<f64>,
    pub fiber: Option<f64>,
    pub salt: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ingredient {
    pub id: Uuid,
    pub name: String,
    pub unit: String,
    pub basis: NutritionBasis,
    #[serde(flatten)]
    pub facts: NutritionFacts,
}

#[derive(Debug, FromRow)]
pub struct IngredientRow {
    pub id: Uuid,
    pub name: String,
    pub unit: String,
    pub basis: String,
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carbohydrates: Option<f64>,
    pub fiber: Option<f64>,
    pub salt: Option<f64>,
}

impl TryFrom<IngredientRow> for Ingredient {
    type Error = anyhow::Error;

    fn try_from(r: IngredientRow) -> Result<Self, Self::Error> {
        let basis = NutritionBasis::parse(&r.basis)
            .ok_or_else(|| anyhow::anyhow!("unknown nutrition basis {:?} for {}", r.basis, r.name))?;
        Ok(Self {
            id: r.id,
            name: r.name,
            unit: r.unit,
            basis,
            facts: NutritionFacts {
                calories: r.calories,
                protein: r.protein,
                fat: r.fat,
                carbohydrates: r.carbohydrates,
                fiber: r.fiber,
                salt: r.salt,
            },
        })
    }
}

/// Recipe-level totals. Replaced as a whole on every recompute.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, FromRow)]
pub struct NutritionSummary {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbohydrates: f64,
    pub fiber: f64,
    pub salt: f64,
}

impl std::ops::AddAssign for NutritionSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.calories += rhs.calories;
        self.protein += rhs.protein;
        self.fat += rhs.fat;
        self.carbohydrates += rhs.carbohydrates;
        self.fiber += rhs.fiber;
        self.salt += rhs.salt;
    }
}

/// One ingredient line of a recipe, with the referenced ingredient resolved.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeIngredientLine {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub quantity: f64,
    pub ingredient: Ingredient,
}

#[derive(Debug, FromRow)]
pub struct LineRow {
    pub line_id: Uuid,
    pub recipe_id: Uuid,
    pub quantity: f64,
    #[sqlx(flatten)]
    pub ingredient: IngredientRow,
}

impl TryFrom<LineRow> for RecipeIngredientLine {
    type Error = anyhow::Error;

    fn try_from(r: LineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.line_id,
            recipe_id: r.recipe_id,
            quantity: r.quantity,
            ingredient: r.ingredient.try_into()?,
        })
    }
}
