use std::collections::HashMap;

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::dto::{ImageView, LineView, RecipeDetail, RecipeListItem};
use super::repo;
use super::repo_types::Image;
use crate::error::AppError;
use crate::generation::GenerationError;
use crate::nutrition::{self, NutritionResult};
use crate::state::AppState;

pub const MAX_TITLE_CHARS: usize = 200;
const PRESIGN_TTL_SECS: u64 = 30 * 60;

lazy_static! {
    static ref NUMBERED_ITEM: Regex = Regex::new(r"^\s*\d+\s*[.)．]\s*(.+?)\s*$").unwrap();
    static ref STEPS_HEADING: Regex =
        Regex::new(r"(?i)^\s*(#+\s*|\*\*)?\s*(steps|instructions|directions|method|作り方)").unwrap();
}

pub fn validate_title(title: &str) -> Result<&str, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title)
}

/// Instructions of the numbered list in generated markdown. When a steps
/// heading is present only the items after it are taken.
pub fn parse_steps(markdown: &str) -> Vec<String> {
    let lines: Vec<&str> = markdown.lines().collect();
    let start = lines
        .iter()
        .position(|l| STEPS_HEADING.is_match(l))
        .map(|i| i + 1)
        .unwrap_or(0);
    lines[start..]
        .iter()
        .filter_map(|l| NUMBERED_ITEM.captures(l))
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct.split(';').next().unwrap_or_default().trim() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

pub(crate) fn mirror_key(user_id: Uuid, recipe_id: Uuid, image_id: Uuid, content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!("recipes/{}/{}-{}.{}", user_id, recipe_id, image_id, ext)
}

/// Generates an image for `markdown` and mirrors it into the bucket.
/// Returns the generator URL and the stored key.
async fn generate_and_mirror(
    st: &AppState,
    user_id: Uuid,
    recipe_id: Uuid,
    image_id: Uuid,
    markdown: &str,
) -> Result<(String, String), AppError> {
    let url = st.image_gen.generate_image(markdown).await?;
    let fetched = st.image_gen.fetch_image(&url).await?;
    let key = mirror_key(user_id, recipe_id, image_id, &fetched.content_type);
    st.storage
        .put_object(&key, fetched.body, &fetched.content_type)
        .await
        .map_err(|e| GenerationError::Mirror(format!("{:#}", e)))?;
    Ok((url, key))
}

async fn discard_object(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        error!(error = %e, key, "failed to remove mirrored image");
    }
}

/// Removes mirrored images whose rows are already gone. Failures are logged.
pub async fn discard_objects(st: &AppState, keys: &[String]) {
    for key in keys {
        discard_object(st, key).await;
    }
}

/// Title in, stored recipe with steps and image out. Nothing is persisted
/// unless every stage succeeds.
#[instrument(skip(st))]
pub async fn create_recipe(st: &AppState, user_id: Uuid, title: &str) -> Result<RecipeDetail, AppError> {
    let title = validate_title(title)?;

    let markdown = st.text_gen.generate(title).await?;
    if markdown.trim().is_empty() {
        return Err(GenerationError::EmptyResponse.into());
    }
    let steps = parse_steps(&markdown);
    if steps.is_empty() {
        warn!(%user_id, "generated recipe has no numbered steps");
    }

    let recipe_id = Uuid::new_v4();
    let image_id = Uuid::new_v4();
    let (image_url, key) = generate_and_mirror(st, user_id, recipe_id, image_id, &markdown).await?;

    let persisted = async {
        let mut tx = st.db.begin().await.context("begin tx")?;
        let recipe = repo::insert_recipe_tx(&mut tx, recipe_id, user_id, title, &markdown).await?;
        let steps = repo::insert_steps_tx(&mut tx, recipe_id, &steps).await?;
        let image = repo::insert_image_tx(&mut tx, image_id, recipe_id, &image_url, Some(&key), false).await?;
        tx.commit().await.context("commit tx")?;
        anyhow::Ok((recipe, steps, image))
    }
    .await;

    let (recipe, steps, image) = match persisted {
        Ok(v) => v,
        Err(e) => {
            discard_object(st, &key).await;
            return Err(e.into());
        }
    };

    info!(recipe_id = %recipe.id, %user_id, steps = steps.len(), "recipe created");
    let images = present_images(st, vec![image]).await;
    Ok(RecipeDetail {
        nutrition: NutritionResult::new(recipe.id, None),
        recipe,
        steps,
        images,
        ingredients: Vec::new(),
    })
}

/// Adds a freshly generated image to an existing recipe.
#[instrument(skip(st))]
pub async fn regenerate_image(st: &AppState, user_id: Uuid, recipe_id: Uuid) -> Result<ImageView, AppError> {
    let recipe = repo::find_owned(&st.db, user_id, recipe_id)
        .await?
        .ok_or(AppError::NotFound("recipe"))?;

    let image_id = Uuid::new_v4();
    let (image_url, key) =
        generate_and_mirror(st, user_id, recipe.id, image_id, &recipe.markdown_content).await?;

    let persisted = async {
        let mut tx = st.db.begin().await.context("begin tx")?;
        let image = repo::insert_image_tx(&mut tx, image_id, recipe.id, &image_url, Some(&key), true).await?;
        tx.commit().await.context("commit tx")?;
        anyhow::Ok(image)
    }
    .await;

    let image = match persisted {
        Ok(i) => i,
        Err(e) => {
            discard_object(st, &key).await;
            return Err(e.into());
        }
    };
    info!(%recipe_id, image_id = %image.id, "recipe image regenerated");
    Ok(present_images(st, vec![image]).await.remove(0))
}

/// Attaches a display URL to each image: a presigned link for mirrored
/// copies, the generator URL otherwise.
pub async fn present_images(st: &AppState, images: Vec<Image>) -> Vec<ImageView> {
    let mut out = Vec::with_capacity(images.len());
    for image in images {
        let url = match image.storage_key.as_deref() {
            Some(key) => match st.storage.presign_get(key, PRESIGN_TTL_SECS).await {
                Ok(u) => u,
                Err(e) => {
                    warn!(error = %e, key, "presign failed; using generator url");
                    image.image_url.clone()
                }
            },
            None => image.image_url.clone(),
        };
        out.push(ImageView::new(image, url));
    }
    out
}

pub async fn list_recipes(st: &AppState, user_id: Uuid) -> Result<Vec<RecipeListItem>, AppError> {
    let recipes = repo::list_by_user(&st.db, user_id).await?;
    let ids: Vec<Uuid> = recipes.iter().map(|r| r.id).collect();
    let images = if ids.is_empty() {
        Vec::new()
    } else {
        repo::list_images(&st.db, &ids).await?
    };

    let mut by_recipe: HashMap<Uuid, Vec<Image>> = HashMap::new();
    for image in images {
        by_recipe.entry(image.recipe_id).or_default().push(image);
    }

    let mut items = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        let images = by_recipe.remove(&recipe.id).unwrap_or_default();
        items.push(RecipeListItem::new(recipe, present_images(st, images).await));
    }
    Ok(items)
}

pub async fn recipe_detail(st: &AppState, user_id: Uuid, recipe_id: Uuid) -> Result<RecipeDetail, AppError> {
    let recipe = repo::find_owned(&st.db, user_id, recipe_id)
        .await?
        .ok_or(AppError::NotFound("recipe"))?;
    let steps = repo::list_steps(&st.db, recipe.id).await?;
    let images = repo::list_images(&st.db, &[recipe.id]).await?;
    let lines = nutrition::repo::list_lines(&st.db, recipe.id).await?;
    let summary = nutrition::repo::find_summary(&st.db, recipe.id).await?;

    Ok(RecipeDetail {
        nutrition: NutritionResult::new(recipe.id, summary),
        ingredients: lines.into_iter().map(LineView::from).collect(),
        images: present_images(st, images).await,
        steps,
        recipe,
    })
}

#[instrument(skip(st))]
pub async fn delete_recipe(st: &AppState, user_id: Uuid, recipe_id: Uuid) -> Result<(), AppError> {
    let keys = repo::delete_owned(&st.db, user_id, recipe_id)
        .await?
        .ok_or(AppError::NotFound("recipe"))?;
    discard_objects(st, &keys).await;
    info!(%recipe_id, images = keys.len(), "recipe deleted");
    Ok(())
}
