use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::{non_empty, GenerationError, TextGenerator};
use crate::config::GenerationConfig;

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const MAX_COMPLETION_TOKENS: u32 = 16_384;

pub(crate) fn recipe_prompt(title: &str) -> String {
    format!(
        "You are a nutritionist and recipe developer.\n\
         Propose a nutritionally balanced dish that is easy to cook at home and meets these conditions:\n\
         - can be cooked in 3 steps\n\
         - uses only basic pantry seasonings (salt, soy sauce, sugar, oil and the like)\n\
         - one serving contains a balance of protein, carbohydrates and vegetables\n\
         - ready within 20 minutes\n\
         - leaves few dishes to wash\n\n\
         Output format:\n\
         ---\n\
         Dish name:\n\
         Ingredients:\n\
         Steps: (a numbered list)\n\
         Nutrition notes:\n\
         ---\n\
         Theme: {}",
        title.trim()
    )
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    max_completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Azure OpenAI chat-completions deployment.
#[derive(Clone)]
pub struct AzureChatGenerator {
    client: Client,
    url: String,
    api_key: String,
}

impl AzureChatGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            config.endpoint.trim_end_matches('/'),
            config.deployment,
            config.api_version
        );
        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone(),
        })
    }
}

fn first_choice(res: ChatResponse) -> Result<String, GenerationError> {
    let content = res.choices.into_iter().next().and_then(|c| c.message.content);
    non_empty(content)
}

#[async_trait]
impl TextGenerator for AzureChatGenerator {
    #[instrument(skip(self))]
    async fn generate(&self, title: &str) -> Result<String, GenerationError> {
        let prompt = recipe_prompt(title);
        let body = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_completion_tokens: MAX_COMPLETION_TOKENS,
        };

        let res = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!(%status, body = %body, "chat completion failed");
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        let text = first_choice(parsed)?;
        debug!(chars = text.len(), "recipe text generated");
        Ok(text)
    }
}
