use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ChatMessage, LlmProvider};
use crate::config::PipelineSettings;
use crate::core::pipeline::RoleExecutor;

const SYNTHESIS_INSTRUCTION: &str = "You are the editor. Condense the work below into an \
executive summary: key findings first, then open risks, then recommended next steps. \
Keep it under 300 words.";

/// Drives each pipeline role with one model call.
pub struct LlmRoleExecutor {
    provider: Arc<dyn LlmProvider>,
    model: String,
    instructions: BTreeMap<String, String>,
}

impl LlmRoleExecutor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        instructions: BTreeMap<String, String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            instructions,
        }
    }

    pub fn from_settings(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        settings: &PipelineSettings,
    ) -> Self {
        Self::new(provider, model, settings.instructions.clone())
    }

    fn instruction_for(&self, role: &str) -> String {
        self.instructions.get(role).cloned().unwrap_or_else(|| {
            format!(
                "You are the {}. Build on the work so far and return the improved full text.",
                role
            )
        })
    }

    async fn call(&self, messages: Vec<ChatMessage>, cancel: CancellationToken) -> Result<String> {
        tokio::select! {
            _ = cancel.cancelled() => bail!("model call cancelled"),
            reply = self.provider.generate(&self.model, &messages) => reply,
        }
    }
}

#[async_trait]
impl RoleExecutor for LlmRoleExecutor {
    async fn execute_role(
        &self,
        role: &str,
        context: &str,
        cancel: CancellationToken,
    ) -> Result<String> {
        let messages = vec![
            ChatMessage::system(self.instruction_for(role)),
            ChatMessage::user(context),
        ];
        let reply = self.call(messages, cancel).await?;
        if reply.trim().is_empty() {
            bail!("role '{}' returned an empty reply", role);
        }
        Ok(reply)
    }

    async fn synthesize(&self, context: &str, cancel: CancellationToken) -> Result<String> {
        let messages = vec![
            ChatMessage::system(SYNTHESIS_INSTRUCTION),
            ChatMessage::user(context),
        ];
        self.call(messages, cancel).await
    }
}
