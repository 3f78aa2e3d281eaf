use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::repo_types::{Image, Recipe, Step};

const RECIPE_COLUMNS: &str = "id, user_id, title, markdown_content, nutrition_satisfied, created_at";
const IMAGE_COLUMNS: &str = "id, recipe_id, image_url, storage_key, is_regenerated, created_at";

pub async fn find_owned(db: &PgPool, user_id: Uuid, recipe_id: Uuid) -> anyhow::Result<Option<Recipe>> {
    let recipe = sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {} FROM recipes WHERE id = $1 AND user_id = $2",
        RECIPE_COLUMNS
    ))
    .bind(recipe_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("find recipe")?;
    Ok(recipe)
}

pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {} FROM recipes WHERE user_id = $1 ORDER BY created_at DESC",
        RECIPE_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list recipes")?;
    Ok(rows)
}

/// Locks the recipe row for the rest of the transaction. `false` when the
/// recipe does not exist or belongs to someone else.
pub async fn lock_owned_recipe_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    recipe_id: Uuid,
) -> anyhow::Result<bool> {
    let row: Option<(Uuid,)> =
        sqlx::query_as(r#"SELECT id FROM recipes WHERE id = $1 AND user_id = $2 FOR UPDATE"#)
            .bind(recipe_id)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .context("lock recipe")?;
    Ok(row.is_some())
}

pub async fn set_nutrition_satisfied_tx(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    satisfied: bool,
) -> anyhow::Result<()> {
    sqlx::query(r#"UPDATE recipes SET nutrition_satisfied = $2 WHERE id = $1"#)
        .bind(recipe_id)
        .bind(satisfied)
        .execute(&mut **tx)
        .await
        .context("update nutrition_satisfied")?;
    Ok(())
}

pub async fn insert_recipe_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    user_id: Uuid,
    title: &str,
    markdown: &str,
) -> anyhow::Result<Recipe> {
    let recipe = sqlx::query_as::<_, Recipe>(&format!(
        r#"
        INSERT INTO recipes (id, user_id, title, markdown_content)
        VALUES ($1, $2, $3, $4)
        RETURNING {}
        "#,
        RECIPE_COLUMNS
    ))
    .bind(id)
    .bind(user_id)
    .bind(title)
    .bind(markdown)
    .fetch_one(&mut **tx)
    .await
    .context("insert recipe")?;
    Ok(recipe)
}

/// Inserts steps numbered from 1 in the given order.
pub async fn insert_steps_tx(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    instructions: &[String],
) -> anyhow::Result<Vec<Step>> {
    let mut steps = Vec::with_capacity(instructions.len());
    for (i, text) in instructions.iter().enumerate() {
        let step = sqlx::query_as::<_, Step>(
            r#"
            INSERT INTO steps (recipe_id, step_number, instruction)
            VALUES ($1, $2, $3)
            RETURNING id, recipe_id, step_number, instruction
            "#,
        )
        .bind(recipe_id)
        .bind(i as i32 + 1)
        .bind(text)
        .fetch_one(&mut **tx)
        .await
        .with_context(|| format!("insert step {}", i + 1))?;
        steps.push(step);
    }
    Ok(steps)
}

pub async fn insert_image_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    recipe_id: Uuid,
    image_url: &str,
    storage_key: Option<&str>,
    is_regenerated: bool,
) -> anyhow::Result<Image> {
    let image = sqlx::query_as::<_, Image>(&format!(
        r#"
        INSERT INTO images (id, recipe_id, image_url, storage_key, is_regenerated)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        IMAGE_COLUMNS
    ))
    .bind(id)
    .bind(recipe_id)
    .bind(image_url)
    .bind(storage_key)
    .bind(is_regenerated)
    .fetch_one(&mut **tx)
    .await
    .context("insert image")?;
    Ok(image)
}

pub async fn list_steps(db: &PgPool, recipe_id: Uuid) -> anyhow::Result<Vec<Step>> {
    let rows = sqlx::query_as::<_, Step>(
        r#"
        SELECT id, recipe_id, step_number, instruction
        FROM steps
        WHERE recipe_id = $1
        ORDER BY step_number ASC
        "#,
    )
    .bind(recipe_id)
    .fetch_all(db)
    .await
    .context("list steps")?;
    Ok(rows)
}

/// Images of several recipes, newest first.
pub async fn list_images(db: &PgPool, recipe_ids: &[Uuid]) -> anyhow::Result<Vec<Image>> {
    let rows = sqlx::query_as::<_, Image>(&format!(
        "SELECT {} FROM images WHERE recipe_id = ANY($1) ORDER BY created_at DESC",
        IMAGE_COLUMNS
    ))
    .bind(recipe_ids)
    .fetch_all(db)
    .await
    .context("list images")?;
    Ok(rows)
}

/// Deletes the recipe and returns the storage keys of its mirrored images.
/// `None` when the recipe is not the user's.
pub async fn delete_owned(db: &PgPool, user_id: Uuid, recipe_id: Uuid) -> anyhow::Result<Option<Vec<String>>> {
    let mut tx = db.begin().await.context("begin tx")?;
    if !lock_owned_recipe_tx(&mut tx, user_id, recipe_id).await? {
        return Ok(None);
    }
    let keys: Vec<(Option<String>,)> =
        sqlx::query_as(r#"SELECT storage_key FROM images WHERE recipe_id = $1"#)
            .bind(recipe_id)
            .fetch_all(&mut *tx)
            .await
            .context("collect image keys")?;
    sqlx::query(r#"DELETE FROM recipes WHERE id = $1"#)
        .bind(recipe_id)
        .execute(&mut *tx)
        .await
        .context("delete recipe")?;
    tx.commit().await.context("commit tx")?;
    Ok(Some(keys.into_iter().filter_map(|(k,)| k).collect()))
}
