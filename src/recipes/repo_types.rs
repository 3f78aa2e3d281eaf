use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
pub struct Recipe {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub markdown_content: String,
    pub nutrition_satisfied: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One numbered instruction of a recipe, 1-based.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
pub struct Step {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub step_number: i32,
    pub instruction: String,
}

impl Step {
    /// First `len` characters of the instruction, with `...` when cut.
    pub fn short_instruction(&self, len: usize) -> String {
        if self.instruction.chars().count() <= len {
            return self.instruction.clone();
        }
        let head: String = self.instruction.chars().take(len).collect();
        format!("{}...", head)
    }
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
pub struct Image {
    pub id: Uuid,
    pub recipe_id: Uuid,
    /// URL returned by the image generator. Generator URLs expire.
    pub image_url: String,
    /// Key of the mirrored copy in object storage.
    pub storage_key: Option<String>,
    pub is_regenerated: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Image {
    /// Last path segment of the image URL, without query string.
    pub fn filename(&self) -> &str {
        let path = self.image_url.split(['?', '#']).next().unwrap_or_default();
        path.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
    }
}
