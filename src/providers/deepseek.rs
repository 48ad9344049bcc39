// src/providers/deepseek.rs

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::config::DeepSeekConfig;
use crate::errors::Result;
use crate::providers::chat::{self, ChatMessage, ChatRequest};
use crate::providers::{require_credential, send, CallPolicy, LlmProvider, ProviderId};

/// A provider for DeepSeek's OpenAI-compatible chat API.
pub struct DeepSeekProvider {
    client: Client,
    config: DeepSeekConfig,
}

impl DeepSeekProvider {
    /// Creates a new `DeepSeekProvider`.
    pub fn new(client: Client, config: DeepSeekConfig) -> Self {
        Self { client, config }
    }

    fn body<'a>(&'a self, prompt: &'a str, max_tokens: u32) -> ChatRequest<'a> {
        let settings = &self.config.settings;
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.config.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        ChatRequest {
            model: &settings.model,
            messages,
            max_tokens: Some(max_tokens),
            temperature: settings.temperature,
            top_p: self.config.top_p,
            n: Some(1),
        }
    }
}

#[async_trait]
impl LlmProvider for DeepSeekProvider {
    fn id(&self) -> ProviderId {
        ProviderId::DeepSeek
    }

    fn policy(&self) -> CallPolicy {
        CallPolicy::from(&self.config.settings)
    }

    async fn generate(&self, prompt: &str, max_tokens: u32, cancel: CancellationToken) -> Result<String> {
        let settings = &self.config.settings;
        let api_key = require_credential(settings, ProviderId::DeepSeek)?;
        let url = settings.endpoint("chat/completions");

        debug!("📡 Calling DeepSeek: {} with model: {} ({} tokens)", url, settings.model, max_tokens);

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&self.body(prompt, max_tokens));

        let body = send(ProviderId::DeepSeek, request, &cancel).await?;
        chat::parse_chat_response(&body)
    }
}
