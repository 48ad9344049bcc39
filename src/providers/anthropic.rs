// src/providers/anthropic.rs

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::AnthropicConfig;
use crate::errors::{ProviderError, Result};
use crate::providers::{decode, require_credential, send, CallPolicy, LlmProvider, ProviderId};

/// A provider for interacting with Anthropic Claude models.
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WebSearchTool>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WebSearchTool {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    max_uses: u32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    content_type: String,
    text: Option<String>,
}

impl AnthropicProvider {
    /// Creates a new `AnthropicProvider`.
    pub fn new(client: Client, config: AnthropicConfig) -> Self {
        Self { client, config }
    }

    fn body<'a>(&'a self, prompt: &'a str, max_tokens: u32) -> AnthropicRequest<'a> {
        let settings = &self.config.settings;
        let mut tools = Vec::new();
        if settings.web_search {
            tools.push(WebSearchTool {
                kind: "web_search_20250305",
                name: "web_search",
                max_uses: 3,
            });
        }
        AnthropicRequest {
            model: &settings.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            // the Messages API rejects requests without max_tokens
            max_tokens: max_tokens.max(1),
            temperature: settings.temperature,
            tools,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Claude
    }

    fn policy(&self) -> CallPolicy {
        CallPolicy::from(&self.config.settings)
    }

    async fn generate(&self, prompt: &str, max_tokens: u32, cancel: CancellationToken) -> Result<String> {
        let settings = &self.config.settings;
        let api_key = require_credential(settings, ProviderId::Claude)?;
        let url = settings.endpoint("v1/messages");

        debug!("📡 Calling Anthropic: {} with model: {}", url, settings.model);

        let request = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.config.version)
            .header("Content-Type", "application/json")
            .json(&self.body(prompt, max_tokens));

        let body = send(ProviderId::Claude, request, &cancel).await?;
        parse_response(&body)
    }
}

/// Concatenates the text blocks of a Messages API response.
///
/// Tool-use and search-result blocks are skipped; with web search enabled the
/// answer arrives split across several text blocks.
fn parse_response(body: &str) -> Result<String> {
    let resp: AnthropicResponse = decode(body)?;

    let text: String = resp
        .content
        .into_iter()
        .filter(|block| block.content_type == "text")
        .filter_map(|block| block.text)
        .collect();

    if !text.trim().is_empty() {
        return Ok(text);
    }

    match resp.stop_reason.as_deref() {
        Some("refusal") => Err(ProviderError::Blocked("Claude declined to answer".to_string())),
        _ => Err(ProviderError::MalformedResponse("No Claude response".to_string())),
    }
}
