use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::{FetchedImage, GenerationError, ImageGenerator};
use crate::config::GenerationConfig;

pub(crate) fn image_prompt(recipe_markdown: &str) -> String {
    format!(
        "You are a food visual artist.\n\
         Depict the finished dish of the following recipe so it looks realistic and delicious.\n\n\
         ---\n{}\n---\n\n\
         Output style: photorealistic food photograph with bright lighting",
        recipe_markdown.trim()
    )
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    style: &'a str,
    quality: &'a str,
    n: u8,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

/// DALL-E 3 compatible image endpoint with bearer auth.
#[derive(Clone)]
pub struct DalleImageGenerator {
    client: Client,
    url: String,
    api_key: String,
}

impl DalleImageGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.image_api_url.clone(),
            api_key: config.image_api_key.clone(),
        })
    }
}

fn first_url(res: ImageResponse) -> Result<String, GenerationError> {
    res.data
        .into_iter()
        .next()
        .and_then(|d| d.url)
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| GenerationError::InvalidResponse("no image url in response".into()))
}

fn download_status(status: reqwest::StatusCode) -> Result<(), GenerationError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(GenerationError::Mirror(format!("download returned {}", status)))
    }
}

#[async_trait]
impl ImageGenerator for DalleImageGenerator {
    #[instrument(skip(self, recipe_markdown))]
    async fn generate_image(&self, recipe_markdown: &str) -> Result<String, GenerationError> {
        let prompt = image_prompt(recipe_markdown);
        let body = ImageRequest {
            model: "dall-e-3",
            prompt: &prompt,
            size: "1024x1024",
            style: "vivid",
            quality: "standard",
            n: 1,
        };
        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!(%status, body = %body, "image generation failed");
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: ImageResponse = res
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        let url = first_url(parsed)?;
        debug!(url = %url, "image generated");
        Ok(url)
    }

    #[instrument(skip(self))]
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage, GenerationError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GenerationError::Mirror(e.to_string()))?;
        download_status(res.status())?;
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let body = res
            .bytes()
            .await
            .map_err(|e| GenerationError::Mirror(e.to_string()))?;
        if body.is_empty() {
            return Err(GenerationError::Mirror("downloaded image is empty".into()));
        }
        Ok(FetchedImage { body, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_recipe() {
        let p = image_prompt("\n1. Grill the fish\n");
        assert!(p.contains("---\n1. Grill the fish\n---"));
    }

    #[test]
    fn extracts_first_url() {
        let res: ImageResponse = serde_json::from_str(
            r#"{"created":1,"data":[{"url":"https://img.example/a.png","revised_prompt":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(first_url(res).unwrap(), "https://img.example/a.png");
    }

    #[test]
    fn failed_download_is_a_mirror_error() {
        assert!(download_status(reqwest::StatusCode::OK).is_ok());
        for status in [
            reqwest::StatusCode::NOT_FOUND,
            reqwest::StatusCode::FORBIDDEN,
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            assert_eq!(
                download_status(status),
                Err(GenerationError::Mirror(format!("download returned {}", status)))
            );
        }
    }

    #[test]
    fn missing_url_is_invalid() {
        for body in [r#"{"data":[]}"#, r#"{"data":[{"url":null}]}"#, r#"{"error":{}}"#] {
            let res: ImageResponse = serde_json::from_str(body).unwrap();
            assert!(matches!(first_url(res), Err(GenerationError::InvalidResponse(_))));
        }
    }
}
