use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, LlmProvider};
use crate::config::LlmSettings;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Any endpoint speaking the chat-completions wire format.
pub struct OpenAiCompatibleProvider {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            client: Client::new(),
        }
    }

    /// Local servers often run without a key, so a missing one only drops
    /// the Authorization header.
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self::new(settings.base_url.clone(), settings.api_key())
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn generate(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String> {
        let req = CompletionRequest {
            model: model_id,
            messages: messages
                .iter()
                .map(|m| RequestMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
        };

        let mut request = self.client.post(&self.base_url).json(&req);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let res = request.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            return Err(anyhow!(
                "LLM API error ({}): {}",
                status,
                res.text().await.unwrap_or_default()
            ));
        }
        let parsed: CompletionResponse = res.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}
