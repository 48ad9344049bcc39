// src/providers/openai.rs

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{OpenAIApiStyle, OpenAIConfig};
use crate::errors::{ProviderError, Result};
use crate::providers::chat::{self, ChatMessage, ChatRequest};
use crate::providers::{decode, require_credential, send, CallPolicy, LlmProvider, ProviderId};

/// A provider for interacting with OpenAI models.
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Option<Vec<OutputItem>>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Option<Vec<OutputContent>>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputContent {
    OutputText {
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Other,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider`.
    pub fn new(client: Client, config: OpenAIConfig) -> Self {
        Self { client, config }
    }

    fn responses_body<'a>(&'a self, prompt: &'a str, max_tokens: u32) -> ResponsesRequest<'a> {
        let settings = &self.config.settings;
        let mut tools = Vec::new();
        if settings.web_search {
            tools.push(Tool { kind: "web_search" });
        }
        ResponsesRequest {
            model: &settings.model,
            input: prompt,
            max_output_tokens: max_tokens,
            temperature: settings.temperature,
            tools,
        }
    }

    fn chat_body<'a>(&'a self, prompt: &'a str, max_tokens: u32) -> ChatRequest<'a> {
        let settings = &self.config.settings;
        ChatRequest {
            model: &settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: Some(max_tokens),
            temperature: settings.temperature,
            top_p: None,
            n: None,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAI
    }

    fn policy(&self) -> CallPolicy {
        CallPolicy::from(&self.config.settings)
    }

    async fn generate(&self, prompt: &str, max_tokens: u32, cancel: CancellationToken) -> Result<String> {
        let settings = &self.config.settings;
        let api_key = require_credential(settings, ProviderId::OpenAI)?;

        let request = match self.config.api_style {
            OpenAIApiStyle::Responses => self
                .client
                .post(settings.endpoint("responses"))
                .json(&self.responses_body(prompt, max_tokens)),
            OpenAIApiStyle::Chat => self
                .client
                .post(settings.endpoint("chat/completions"))
                .json(&self.chat_body(prompt, max_tokens)),
        };

        debug!("📡 Calling OpenAI ({:?}) with model: {}", self.config.api_style, settings.model);

        let body = send(
            ProviderId::OpenAI,
            request.header("Authorization", format!("Bearer {}", api_key)),
            &cancel,
        )
        .await?;

        match self.config.api_style {
            OpenAIApiStyle::Responses => parse_responses(&body),
            OpenAIApiStyle::Chat => chat::parse_chat_response(&body),
        }
    }
}

/// Extracts the answer from a `responses` payload.
///
/// Uses the aggregated `output_text` when the API supplies it, otherwise
/// concatenates every `output_text` item of every output message.
fn parse_responses(body: &str) -> Result<String> {
    let resp: ResponsesResponse = decode(body)?;

    if let Some(text) = resp.output_text.filter(|t| !t.trim().is_empty()) {
        return Ok(text);
    }

    let text: String = resp
        .output
        .unwrap_or_default()
        .into_iter()
        .flat_map(|item| item.content.unwrap_or_default())
        .filter_map(|content| match content {
            OutputContent::OutputText { text } => Some(text),
            OutputContent::Other => None,
        })
        .collect();

    if text.trim().is_empty() {
        return Err(ProviderError::MalformedResponse("No answer returned".to_string()));
    }
    Ok(text)
}
