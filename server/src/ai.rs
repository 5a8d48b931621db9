use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::spawn;
use tracing::{info, warn};

use memoryscape_core::{config::AppConfig, memory::MemoryRecord};

use crate::{socket::broadcast::DomainEvent, state::AppState};

/// A generated caption for a memory. Applied on top of whatever the author
/// wrote: existing titles are never overwritten, only filled in.
#[derive(Debug, Clone)]
pub struct CaptionResult {
    pub title: Option<String>,
    pub summary: String,
    pub tags: Vec<String>,
}

/// Adapter seam for caption generation. `Ok(None)` means captioning is not
/// configured; errors mean the provider was asked and failed.
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, memory: &MemoryRecord) -> Result<Option<CaptionResult>>;
}

pub fn build_captioner(config: &AppConfig) -> Arc<dyn Captioner> {
    match config.ai_api_key.as_deref() {
        Some(api_key) => Arc::new(OpenAiCaptioner::new(
            api_key,
            &config.ai_base_url,
            &config.ai_model,
        )),
        None => Arc::new(NoopCaptioner),
    }
}

/// Used when no API key is configured; memories simply go uncaptioned.
pub struct NoopCaptioner;

#[async_trait]
impl Captioner for NoopCaptioner {
    async fn caption(&self, _memory: &MemoryRecord) -> Result<Option<CaptionResult>> {
        Ok(None)
    }
}

pub struct OpenAiCaptioner {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCaptioner {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.to_owned(),
        }
    }

    fn build_prompt(memory: &MemoryRecord) -> String {
        let mut prompt = format!("Memory kind: {}.", memory.kind.as_str());
        if let Some(title) = memory.title.as_deref() {
            prompt.push_str(&format!(" Title: {title}."));
        }
        if let Some(body) = memory.body.as_deref() {
            prompt.push_str(&format!(" Text: {body}."));
        }
        if let Some(media_url) = memory.media_url.as_deref() {
            prompt.push_str(&format!(" Media URL: {media_url}."));
        }
        prompt
    }
}

const CAPTION_SYSTEM_PROMPT: &str = "You caption shared memories for a collaborative scrapbook. \
    Reply with a JSON object containing \"title\" (short, may be null), \
    \"summary\" (one or two sentences), and \"tags\" (up to five lowercase keywords).";

#[async_trait]
impl Captioner for OpenAiCaptioner {
    async fn caption(&self, memory: &MemoryRecord) -> Result<Option<CaptionResult>> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": CAPTION_SYSTEM_PROMPT },
                { "role": "user", "content": Self::build_prompt(memory) },
            ],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("request caption completion")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(anyhow!("caption endpoint error {status}: {body}"));
        }

        let payload = response
            .json::<CompletionResponse>()
            .await
            .context("decode caption completion")?;

        let content = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("caption completion had no choices"))?;

        let parsed: CaptionPayload =
            serde_json::from_str(&content).context("decode caption payload")?;

        Ok(Some(CaptionResult {
            title: parsed.title.filter(|title| !title.trim().is_empty()),
            summary: parsed.summary,
            tags: parsed.tags,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CaptionPayload {
    #[serde(default)]
    title: Option<String>,
    summary: String,
    #[serde(default)]
    tags: Vec<String>,
}

/// Caption generation happens off the request path. Failures are logged and
/// swallowed; the memory stays exactly as the author wrote it.
pub fn spawn_caption_task(state: &AppState, memory: MemoryRecord) {
    let captioner = state.captioner.clone();
    let memory_store = state.memory_store.clone();
    let broadcaster = state.broadcaster.clone();

    spawn(async move {
        let memory_id = memory.id.clone();
        let result = match captioner.caption(&memory).await {
            Ok(Some(result)) => result,
            Ok(None) => return,
            Err(err) => {
                warn!(memory_id = %memory_id, error = %err, "caption generation failed");
                return;
            }
        };

        let updated = match memory_store
            .apply_caption(
                memory_id.as_str(),
                result.title.as_deref(),
                Some(result.summary.as_str()),
                result.tags.clone(),
            )
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => return,
            Err(err) => {
                warn!(memory_id = %memory_id, error = %err, "failed to store caption");
                return;
            }
        };

        info!(memory_id = %memory_id, "caption applied");

        let capsule_id: String = updated.capsule_id.clone().into();
        broadcaster.to_capsule(
            &capsule_id,
            DomainEvent::MemoryUpdated {
                memory: updated.into(),
            },
            None,
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoryscape_core::memory::MemoryKind;

    fn sample_memory() -> MemoryRecord {
        MemoryRecord {
            id: "mem-1".parse().expect("memory id"),
            capsule_id: "cap-1".parse().expect("capsule id"),
            kind: MemoryKind::Image,
            title: Some("Beach day".into()),
            body: None,
            media_url: Some("https://cdn.example.com/beach.jpg".into()),
            tags: Vec::new(),
            pinned: false,
            created_by: "user-1".parse().expect("user id"),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn prompt_includes_known_fields() {
        let prompt = OpenAiCaptioner::build_prompt(&sample_memory());
        assert!(prompt.contains("image"));
        assert!(prompt.contains("Beach day"));
        assert!(prompt.contains("beach.jpg"));
    }

    #[tokio::test]
    async fn noop_captioner_returns_none() {
        let memory = sample_memory();
        let result = NoopCaptioner
            .caption(&memory)
            .await
            .expect("noop never fails");
        assert!(result.is_none());
    }
}
