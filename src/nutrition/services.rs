use std::ops::RangeInclusive;

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use super::repo;
use super::repo_types::{Ingredient, NutritionFacts, NutritionSummary, RecipeIngredientLine};
use super::NutritionError;
use crate::error::AppError;
use crate::recipes::repo as recipes_repo;

pub const PROTEIN_KCAL_PER_G: f64 = 4.0;
pub const FAT_KCAL_PER_G: f64 = 9.0;
pub const CARBOHYDRATE_KCAL_PER_G: f64 = 4.0;

/// Daily reference band a recipe is checked against. Bounds are inclusive.
#[derive(Debug, Clone)]
pub struct NutritionTarget {
    pub calories: RangeInclusive<f64>,
    pub protein: RangeInclusive<f64>,
    pub fat: RangeInclusive<f64>,
}

pub const DAILY_TARGET: NutritionTarget = NutritionTarget {
    calories: 1800.0..=2200.0,
    protein: 50.0..=70.0,
    fat: 40.0..=70.0,
};

/// Calorie share of each macro, in percent with one decimal.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct PfcRatio {
    pub protein: f64,
    pub fat: f64,
    pub carbohydrates: f64,
}

impl NutritionFacts {
    /// Facts scaled to `quantity` units of an ingredient with the given basis.
    pub fn contribution(&self, basis: super::NutritionBasis, quantity: f64) -> NutritionSummary {
        let k = basis.factor(quantity);
        let scale = |v: Option<f64>| v.unwrap_or(0.0) * k;
        NutritionSummary {
            calories: scale(self.calories),
            protein: scale(self.protein),
            fat: scale(self.fat),
            carbohydrates: scale(self.carbohydrates),
            fiber: scale(self.fiber),
            salt: scale(self.salt),
        }
    }
}

impl Ingredient {
    pub fn contribution(&self, quantity: f64) -> NutritionSummary {
        self.facts.contribution(self.basis, quantity)
    }
}

impl RecipeIngredientLine {
    pub fn contribution(&self) -> NutritionSummary {
        self.ingredient.contribution(self.quantity)
    }
}

pub fn validate_quantity(ingredient: &str, quantity: f64) -> Result<(), NutritionError> {
    if !quantity.is_finite() || quantity < 0.0 {
        return Err(NutritionError::InvalidQuantity {
            ingredient: ingredient.to_string(),
            quantity,
        });
    }
    Ok(())
}

/// Sums the scaled contribution of every line.
///
/// A negative or non-finite quantity rejects the whole computation; nothing is clamped.
pub fn compute_totals<'a, I>(lines: I) -> Result<NutritionSummary, NutritionError>
where
    I: IntoIterator<Item = (&'a Ingredient, f64)>,
{
    let mut total = NutritionSummary::default();
    for (ingredient, quantity) in lines {
        validate_quantity(&ingredient.name, quantity)?;
        total += ingredient.contribution(quantity);
    }
    Ok(total)
}

pub fn total_calories(summary: &NutritionSummary) -> f64 {
    summary.calories
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn pfc_ratio(summary: &NutritionSummary) -> PfcRatio {
    let p = summary.protein * PROTEIN_KCAL_PER_G;
    let f = summary.fat * FAT_KCAL_PER_G;
    let c = summary.carbohydrates * CARBOHYDRATE_KCAL_PER_G;
    let total = p + f + c;
    if total == 0.0 {
        return PfcRatio::default();
    }
    PfcRatio {
        protein: round1(p / total * 100.0),
        fat: round1(f / total * 100.0),
        carbohydrates: round1(c / total * 100.0),
    }
}

pub fn meets_target(summary: &NutritionSummary, target: &NutritionTarget) -> bool {
    target.calories.contains(&summary.calories)
        && target.protein.contains(&summary.protein)
        && target.fat.contains(&summary.fat)
}

/// `false` when the recipe has no computed nutrition yet.
pub fn meets_nutrition_balance(summary: Option<&NutritionSummary>) -> bool {
    summary.is_some_and(|s| meets_target(s, &DAILY_TARGET))
}

/// Typed view of a recipe's nutrition returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct NutritionResult {
    pub recipe_id: Uuid,
    pub summary: Option<NutritionSummary>,
    pub total_calories: Option<f64>,
    pub pfc_ratio: Option<PfcRatio>,
    pub nutrition_satisfied: bool,
}

impl NutritionResult {
    pub fn new(recipe_id: Uuid, summary: Option<NutritionSummary>) -> Self {
        Self {
            recipe_id,
            total_calories: summary.as_ref().map(total_calories),
            pfc_ratio: summary.as_ref().map(pfc_ratio),
            nutrition_satisfied: meets_nutrition_balance(summary.as_ref()),
            summary,
        }
    }
}

/// Recomputes and stores the recipe's totals from a consistent snapshot of its lines.
#[instrument(skip(db))]
pub async fn recompute_recipe_nutrition(
    db: &PgPool,
    user_id: Uuid,
    recipe_id: Uuid,
) -> Result<NutritionResult, AppError> {
    let mut tx = db.begin().await?;
    if !recipes_repo::lock_owned_recipe_tx(&mut tx, user_id, recipe_id).await? {
        return Err(AppError::NotFound("recipe"));
    }

    let lines = repo::list_lines_tx(&mut tx, recipe_id).await?;
    let summary = compute_totals(lines.iter().map(|l| (&l.ingredient, l.quantity)))?;
    let satisfied = meets_nutrition_balance(Some(&summary));
    repo::replace_summary_tx(&mut tx, recipe_id, &summary).await?;
    recipes_repo::set_nutrition_satisfied_tx(&mut tx, recipe_id, satisfied).await?;
    tx.commit().await?;

    info!(%recipe_id, lines = lines.len(), calories = summary.calories, satisfied, "nutrition recomputed");
    Ok(NutritionResult::new(recipe_id, Some(summary)))
}

/// Adds an ingredient line; takes the recipe lock so a concurrent recompute sees all or nothing.
#[instrument(skip(db))]
pub async fn add_ingredient_line(
    db: &PgPool,
    user_id: Uuid,
    recipe_id: Uuid,
    ingredient_id: Uuid,
    quantity: f64,
) -> Result<RecipeIngredientLine, AppError> {
    let ingredient = repo::find_ingredient(db, ingredient_id)
        .await?
        .ok_or_else(|| AppError::Validation(format!("unknown ingredient {}", ingredient_id)))?;
    validate_quantity(&ingredient.name, quantity)?;

    let mut tx = db.begin().await?;
    if !recipes_repo::lock_owned_recipe_tx(&mut tx, user_id, recipe_id).await? {
        return Err(AppError::NotFound("recipe"));
    }
    let line_id = repo::insert_line_tx(&mut tx, recipe_id, ingredient_id, quantity).await?;
    tx.commit().await?;

    Ok(RecipeIngredientLine {
        id: line_id,
        recipe_id,
        quantity,
        ingredient,
    })
}

pub async fn recipe_nutrition(
    db: &PgPool,
    user_id: Uuid,
    recipe_id: Uuid,
) -> Result<NutritionResult, AppError> {
    if recipes_repo::find_owned(db, user_id, recipe_id).await?.is_none() {
        return Err(AppError::NotFound("recipe"));
    }
    let summary = repo::find_summary(db, recipe_id).await?;
    Ok(NutritionResult::new(recipe_id, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::NutritionBasis;

    fn ingredient(name: &str, basis: NutritionBasis, facts: NutritionFacts) -> Ingredient {
        Ingredient {
            id: Uuid::new_v4(),
            name: name.into(),
            unit: "g".into(),
            basis,
            facts,
        }
    }

    fn banana() -> Ingredient {
        ingredient(
            "Banana",
            NutritionBasis::Per100,
            NutritionFacts {
                calories: Some(89.0),
                protein: Some(1.1),
                fat: Some(0.3),
                carbohydrates: Some(23.0),
                ..Default::default()
            },
        )
    }

    fn egg() -> Ingredient {
        ingredient(
            "Egg",
            NutritionBasis::Per100,
            NutritionFacts {
                calories: Some(155.0),
                protein: Some(13.0),
                fat: Some(11.0),
                carbohydrates: Some(1.1),
                ..Default::default()
            },
        )
    }

    fn summary(calories: f64, protein: f64, fat: f64, carbohydrates: f64) -> NutritionSummary {
        NutritionSummary {
            calories,
            protein,
            fat,
            carbohydrates,
            ..Default::default()
        }
    }

    #[test]
    fn banana_and_egg_totals() {
        let (b, e) = (banana(), egg());
        let total = compute_totals([(&b, 100.0), (&e, 50.0)]).unwrap();
        assert!((total.calories - 166.5).abs() < 1e-9);
        assert!((total.protein - 7.6).abs() < 1e-9);
        assert!((total.fat - 5.8).abs() < 1e-9);
        assert!((total.carbohydrates - 23.55).abs() < 1e-9);
    }

    #[test]
    fn totals_equal_sum_of_line_contributions() {
        let (b, e) = (banana(), egg());
        let lines = [(&b, 37.5), (&e, 212.0), (&b, 0.0), (&e, 3.25)];
        let total = compute_totals(lines).unwrap();

        let mut expected = NutritionSummary::default();
        for (i, q) in lines {
            expected += i.contribution(q);
        }
        assert_eq!(total, expected);
        assert!(total.calories >= 0.0 && total.protein >= 0.0 && total.fat >= 0.0);
    }

    #[test]
    fn per_unit_basis_scales_by_quantity() {
        let slice = ingredient(
            "Bread slice",
            NutritionBasis::PerUnit,
            NutritionFacts {
                calories: Some(89.0),
                protein: Some(1.1),
                fat: Some(0.3),
                carbohydrates: Some(23.0),
                ..Default::default()
            },
        );
        let c = slice.contribution(2.0);
        assert_eq!(c.calories, 178.0);
        assert!((c.protein - 2.2).abs() < 1e-9);
        assert!((c.fat - 0.6).abs() < 1e-9);
        assert_eq!(c.carbohydrates, 46.0);
        assert_eq!(slice.contribution(0.0), NutritionSummary::default());
    }

    #[test]
    fn missing_facts_count_as_zero() {
        let water = ingredient("Water", NutritionBasis::Per100, NutritionFacts::default());
        let total = compute_totals([(&water, 500.0)]).unwrap();
        assert_eq!(total, NutritionSummary::default());
    }

    #[test]
    fn empty_line_set_gives_zero_totals() {
        let total = compute_totals(std::iter::empty()).unwrap();
        assert_eq!(total, NutritionSummary::default());
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let (b, e) = (banana(), egg());
        let err = compute_totals([(&b, 100.0), (&e, -1.0)]).unwrap_err();
        assert_eq!(
            err,
            NutritionError::InvalidQuantity {
                ingredient: "Egg".into(),
                quantity: -1.0
            }
        );
        assert!(compute_totals([(&b, f64::NAN)]).is_err());
        assert!(compute_totals([(&b, f64::INFINITY)]).is_err());
    }

    #[test]
    fn pfc_ratio_sums_to_hundred() {
        let cases = [
            summary(0.0, 50.0, 30.0, 120.0),
            summary(0.0, 1.0, 1.0, 1.0),
            summary(0.0, 7.6, 5.8, 23.55),
            summary(0.0, 0.0, 0.0, 10.0),
            summary(0.0, 33.3, 0.7, 0.01),
        ];
        for s in cases {
            let r = pfc_ratio(&s);
            let sum = r.protein + r.fat + r.carbohydrates;
            assert!((sum - 100.0).abs() <= 0.2, "{:?} sums to {}", r, sum);
        }
    }

    #[test]
    fn pfc_ratio_values_are_rounded_to_one_decimal() {
        let r = pfc_ratio(&summary(0.0, 50.0, 30.0, 120.0));
        // 200 / 270 / 480 kcal out of 950
        assert_eq!(r.protein, 21.1);
        assert_eq!(r.fat, 28.4);
        assert_eq!(r.carbohydrates, 50.5);
    }

    #[test]
    fn pfc_ratio_all_zero_macros() {
        let r = pfc_ratio(&summary(500.0, 0.0, 0.0, 0.0));
        assert_eq!(r, PfcRatio { protein: 0.0, fat: 0.0, carbohydrates: 0.0 });
    }

    #[test]
    fn balance_check_inclusive_bounds() {
        assert!(meets_nutrition_balance(Some(&summary(2000.0, 60.0, 50.0, 250.0))));
        assert!(meets_nutrition_balance(Some(&summary(1800.0, 50.0, 40.0, 0.0))));
        assert!(meets_nutrition_balance(Some(&summary(2200.0, 70.0, 70.0, 0.0))));
        assert!(!meets_nutrition_balance(Some(&summary(1799.9, 60.0, 50.0, 0.0))));
        assert!(!meets_nutrition_balance(Some(&summary(2200.1, 60.0, 50.0, 0.0))));
        assert!(!meets_nutrition_balance(Some(&summary(2000.0, 30.0, 50.0, 250.0))));
        assert!(!meets_nutrition_balance(Some(&summary(2000.0, 60.0, 70.5, 250.0))));
    }

    #[test]
    fn balance_check_without_summary_is_false() {
        assert!(!meets_nutrition_balance(None));
    }

    #[test]
    fn balance_check_is_deterministic() {
        let s = summary(2000.0, 60.0, 50.0, 250.0);
        assert_eq!(
            meets_nutrition_balance(Some(&s)),
            meets_nutrition_balance(Some(&s))
        );
    }

    #[test]
    fn result_without_summary() {
        let id = Uuid::new_v4();
        let r = NutritionResult::new(id, None);
        assert_eq!(r.recipe_id, id);
        assert!(r.summary.is_none() && r.pfc_ratio.is_none() && r.total_calories.is_none());
        assert!(!r.nutrition_satisfied);
    }

    #[test]
    fn result_with_summary() {
        let r = NutritionResult::new(Uuid::new_v4(), Some(summary(500.0, 50.0, 30.0, 120.0)));
        assert_eq!(r.total_calories, Some(500.0));
        assert_eq!(r.pfc_ratio.map(|p| p.protein), Some(21.1));
        assert!(!r.nutrition_satisfied);
    }
}
