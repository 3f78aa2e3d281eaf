//! Clients for the AI services that write recipe text and render dish images.

use async_trait::async_trait;
use bytes::Bytes;

pub mod image;
pub mod text;

pub use image::DalleImageGenerator;
pub use text::AzureChatGenerator;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),
    #[error("generation service returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("generation service returned an empty response")]
    EmptyResponse,
    #[error("unexpected generation response: {0}")]
    InvalidResponse(String),
    #[error("image mirroring failed: {0}")]
    Mirror(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        GenerationError::Request(e.to_string())
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Markdown recipe for the given dish title. Never returns blank text.
    async fn generate(&self, title: &str) -> Result<String, GenerationError>;
}

/// Downloaded image bytes ready to be mirrored.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub body: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// URL of an image depicting the finished dish.
    async fn generate_image(&self, recipe_markdown: &str) -> Result<String, GenerationError>;

    /// Downloads a generated image so it outlives the generator's URL.
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage, GenerationError>;
}

/// Rejects blank generator output.
pub(crate) fn non_empty(text: Option<String>) -> Result<String, GenerationError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(GenerationError::EmptyResponse),
    }
}
