use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;

use super::{ChatMessage, LlmProvider};

/// Replies with a fixed string and keeps every conversation it was sent.
pub(crate) struct CannedProvider {
    reply: Option<String>,
    delay: Option<Duration>,
    pub seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl CannedProvider {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(reply: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::replying(reply)
        }
    }

    pub fn last_user_message(&self) -> String {
        self.seen
            .lock()
            .unwrap()
            .last()
            .and_then(|conv| conv.iter().rev().find(|m| m.role == "user").cloned())
            .map(|m| m.content)
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for CannedProvider {
    async fn generate(&self, _model_id: &str, messages: &[ChatMessage]) -> Result<String> {
        self.seen.lock().unwrap().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => bail!("connection refused"),
        }
    }
}
