use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{ChatMessage, LlmProvider, extract_json_block};
use crate::config::WorkerSpec;
use crate::core::worker::{Worker, WorkerContext, WorkerFactory, WorkerResult};

const REPLY_FORMAT: &str = r#"Reply with a single JSON object:
{"success": true, "message": "<one line summary>",
 "insights": [{"type": "opportunity|trend|lead|improvement|optimization|learning|risk|anomaly", "content": "...", "confidence": 0.0}],
 "action_items": ["..."], "learnings": ["..."]}"#;

/// A worker whose cycle is one model call, driven by the instructions in
/// its [`WorkerSpec`].
pub struct LlmWorker {
    spec: WorkerSpec,
    display_name: String,
    model: String,
    provider: Arc<dyn LlmProvider>,
}

impl LlmWorker {
    pub fn new(spec: WorkerSpec, model: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        let display_name = spec.display_name.clone().unwrap_or_else(|| spec.id.clone());
        Self {
            spec,
            display_name,
            model: model.into(),
            provider,
        }
    }

    fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}.", self.display_name);
        if !self.spec.description.is_empty() {
            prompt.push(' ');
            prompt.push_str(&self.spec.description);
        }
        if !self.spec.instructions.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.spec.instructions);
        }
        prompt
    }
}

/// Read a model reply as a [`WorkerResult`]. Replies that carry no valid
/// result object count as a success whose message is the reply text.
pub fn parse_worker_reply(reply: &str) -> WorkerResult {
    extract_json_block(reply)
        .and_then(|block| serde_json::from_str::<WorkerResult>(block).ok())
        .unwrap_or_else(|| WorkerResult::ok(reply.trim()))
}

#[async_trait]
impl Worker for LlmWorker {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    async fn execute(&self, ctx: &WorkerContext) -> Result<WorkerResult> {
        let context = serde_json::to_string_pretty(ctx).context("serializing worker context")?;
        let messages = [
            ChatMessage::system(format!("{}\n\n{}", self.system_prompt(), REPLY_FORMAT)),
            ChatMessage::user(format!(
                "Cycle {}. Current context:\n{}",
                ctx.cycle_number, context
            )),
        ];
        let reply = self
            .provider
            .generate(&self.model, &messages)
            .await
            .with_context(|| format!("worker '{}' model call failed", self.spec.id))?;
        debug!("Worker [{}] reply: {} chars", self.spec.id, reply.len());
        Ok(parse_worker_reply(&reply))
    }

    async fn provide_assistance(&self, requesting_worker: &str, query: &str) -> Result<Value> {
        let messages = [
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(format!(
                "Worker '{}' asks for your help:\n{}",
                requesting_worker, query
            )),
        ];
        let reply = self.provider.generate(&self.model, &messages).await?;
        let answer = extract_json_block(&reply)
            .and_then(|block| serde_json::from_str::<Value>(block).ok())
            .unwrap_or_else(|| Value::String(reply.trim().to_string()));
        Ok(json!({ "by": self.spec.id, "answer": answer }))
    }
}

/// Rebuilds an [`LlmWorker`] from its [`WorkerSpec`] on restart.
pub struct LlmWorkerFactory {
    spec: WorkerSpec,
    model: String,
    provider: Arc<dyn LlmProvider>,
}

impl LlmWorkerFactory {
    pub fn new(spec: WorkerSpec, model: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            spec,
            model: model.into(),
            provider,
        }
    }
}

#[async_trait]
impl WorkerFactory for LlmWorkerFactory {
    async fn build(&self) -> Result<Arc<dyn Worker>> {
        Ok(Arc::new(LlmWorker::new(
            self.spec.clone(),
            self.model.clone(),
            self.provider.clone(),
        )))
    }
}
