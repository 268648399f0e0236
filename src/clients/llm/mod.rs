mod claude;
mod openai;

pub use claude::ClaudeClient;
pub use openai::OpenAiClient;

use crate::config::LlmConfig;
use crate::error::{KubemendError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// The one capability the loop needs from a language model: a system-guided
/// chat turn returning text. No streaming.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, system: &str, user: &str) -> Result<String>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiClient::new(
            &config.api_key,
            &config.model,
            config.timeout_seconds,
        )?)),
        "claude" | "anthropic" => Ok(Arc::new(ClaudeClient::new(
            &config.api_key,
            &config.model,
            config.timeout_seconds,
        )?)),
        other => Err(KubemendError::FatalConfiguration(format!(
            "Unknown LLM provider: {}",
            other
        ))),
    }
}

/// Models wrap JSON in prose more often than not. Strict parse first, then a
/// bracket scan over the widest `{ … }` span; both paths return the same
/// shape to the caller.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Some(value);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
