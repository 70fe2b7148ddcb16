//! Model-backed implementations of the worker and role-executor seams.

pub mod provider;
pub mod roles;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use provider::OpenAiCompatibleProvider;
pub use roles::LlmRoleExecutor;
pub use worker::{LlmWorker, LlmWorkerFactory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    // Execute a prompt against a model using a structured conversation
    async fn generate(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String>;
}

/// Pull a JSON payload out of a model reply: a fenced ```json block first,
/// then the whole reply if it already looks like JSON.
pub(crate) fn extract_json_block(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let content_start = start + 7;
        if let Some(end) = trimmed[content_start..].find("```") {
            let block = trimmed[content_start..content_start + end].trim();
            if !block.is_empty() {
                return Some(block);
            }
        }
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed);
    }
    None
}
