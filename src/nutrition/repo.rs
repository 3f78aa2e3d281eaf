use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::repo_types::{
    Ingredient, IngredientRow, LineRow, NutritionBasis, NutritionFacts, NutritionSummary,
    RecipeIngredientLine,
};

const INGREDIENT_COLUMNS: &str =
    "id, name, unit, basis, calories, protein, fat, carbohydrates, fiber, salt";

pub async fn list_ingredients(db: &PgPool) -> anyhow::Result<Vec<Ingredient>> {
    let rows = sqlx::query_as::<_, IngredientRow>(&format!(
        "SELECT {} FROM ingredients ORDER BY name ASC",
        INGREDIENT_COLUMNS
    ))
    .fetch_all(db)
    .await
    .context("list ingredients")?;
    rows.into_iter().map(Ingredient::try_from).collect()
}

pub async fn find_ingredient(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Ingredient>> {
    let row = sqlx::query_as::<_, IngredientRow>(&format!(
        "SELECT {} FROM ingredients WHERE id = $1",
        INGREDIENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(db)
    .await
    .context("find ingredient")?;
    row.map(Ingredient::try_from).transpose()
}

/// Inserts a catalog entry. Unique-name violations come back as `sqlx::Error`.
pub async fn insert_ingredient(
    db: &PgPool,
    name: &str,
    unit: &str,
    basis: NutritionBasis,
    facts: &NutritionFacts,
) -> Result<Ingredient, sqlx::Error> {
    let row = sqlx::query_as::<_, IngredientRow>(&format!(
        r#"
        INSERT INTO ingredients (name, unit, basis, calories, protein, fat, carbohydrates, fiber, salt)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        INGREDIENT_COLUMNS
    ))
    .bind(name)
    .bind(unit)
    .bind(basis.as_str())
    .bind(facts.calories)
    .bind(facts.protein)
    .bind(facts.fat)
    .bind(facts.carbohydrates)
    .bind(facts.fiber)
    .bind(facts.salt)
    .fetch_one(db)
    .await?;
    Ingredient::try_from(row).map_err(|e| sqlx::Error::Decode(e.into()))
}

/// Lines of a recipe joined with their ingredients, read inside the caller's transaction.
pub async fn list_lines_tx(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
) -> anyhow::Result<Vec<RecipeIngredientLine>> {
    let rows = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT ri.id AS line_id, ri.recipe_id, ri.quantity,
               i.id, i.name, i.unit, i.basis, i.calories, i.protein, i.fat,
               i.carbohydrates, i.fiber, i.salt
          FROM recipe_ingredients ri
          JOIN ingredients i ON i.id = ri.ingredient_id
         WHERE ri.recipe_id = $1
         ORDER BY i.name ASC
        "#,
    )
    .bind(recipe_id)
    .fetch_all(&mut **tx)
    .await
    .context("list recipe ingredient lines")?;
    rows.into_iter().map(RecipeIngredientLine::try_from).collect()
}

pub async fn list_lines(db: &PgPool, recipe_id: Uuid) -> anyhow::Result<Vec<RecipeIngredientLine>> {
    let mut tx = db.begin().await.context("begin tx")?;
    let lines = list_lines_tx(&mut tx, recipe_id).await?;
    tx.commit().await.context("commit tx")?;
    Ok(lines)
}

pub async fn insert_line_tx(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    ingredient_id: Uuid,
    quantity: f64,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO recipe_ingredients (recipe_id, ingredient_id, quantity)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(recipe_id)
    .bind(ingredient_id)
    .bind(quantity)
    .fetch_one(&mut **tx)
    .await
    .context("insert recipe ingredient line")?;
    Ok(id)
}

/// Overwrites every column of the recipe's summary; never merges with the old row.
pub async fn replace_summary_tx(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    s: &NutritionSummary,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO nutrition (recipe_id, calories, protein, fat, carbohydrates, fiber, salt, computed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, now())
        ON CONFLICT (recipe_id) DO UPDATE
           SET calories = EXCLUDED.calories,
               protein = EXCLUDED.protein,
               fat = EXCLUDED.fat,
               carbohydrates = EXCLUDED.carbohydrates,
               fiber = EXCLUDED.fiber,
               salt = EXCLUDED.salt,
               computed_at = EXCLUDED.computed_at
        "#,
    )
    .bind(recipe_id)
    .bind(s.calories)
    .bind(s.protein)
    .bind(s.fat)
    .bind(s.carbohydrates)
    .bind(s.fiber)
    .bind(s.salt)
    .execute(&mut **tx)
    .await
    .context("replace nutrition summary")?;
    Ok(())
}

pub async fn find_summary(db: &PgPool, recipe_id: Uuid) -> anyhow::Result<Option<NutritionSummary>> {
    let row = sqlx::query_as::<_, NutritionSummary>(
        r#"
        SELECT calories, protein, fat, carbohydrates, fiber, salt
          FROM nutrition
         WHERE recipe_id = $1
        "#,
    )
    .bind(recipe_id)
    .fetch_optional(db)
    .await
    .context("find nutrition summary")?;
    Ok(row)
}
