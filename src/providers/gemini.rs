// src/providers/gemini.rs

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::GeminiConfig;
use crate::errors::{ProviderError, Result};
use crate::providers::{decode, require_credential, send, CallPolicy, LlmProvider, ProviderId};

/// A provider for interacting with Google's Gemini models.
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider`.
    pub fn new(client: Client, config: GeminiConfig) -> Self {
        Self { client, config }
    }

    fn body(&self, prompt: &str, max_tokens: u32) -> serde_json::Value {
        let settings = &self.config.settings;
        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"maxOutputTokens": max_tokens}
        });
        if let Some(temperature) = settings.temperature {
            body["generationConfig"]["temperature"] = json!(temperature);
        }
        if let Some(top_p) = self.config.top_p {
            body["generationConfig"]["topP"] = json!(top_p);
        }
        if settings.web_search {
            body["tools"] = json!([{"google_search": {}}]);
        }
        body
    }

    /// Picks the model to generate with.
    ///
    /// With discovery on, lists the account's models and takes the first
    /// preferred one that supports `generateContent`. Any discovery failure
    /// falls back to the configured model.
    async fn resolve_model(&self, api_key: &str, cancel: &CancellationToken) -> String {
        let default = &self.config.settings.model;
        if !self.config.discover_models {
            return default.clone();
        }

        match self.list_models(api_key, cancel).await {
            Ok(available) => match pick_model(&self.config.preferred_models, &available) {
                Some(model) => {
                    info!("Gemini model discovery picked {}", model);
                    model
                }
                None => {
                    warn!("⚠️  No preferred Gemini model available, using {}", default);
                    default.clone()
                }
            },
            Err(e) => {
                warn!("⚠️  Gemini model discovery failed, using {}: {}", default, e);
                default.clone()
            }
        }
    }

    async fn list_models(&self, api_key: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let url = self
            .config
            .settings
            .endpoint(&format!("{}/models", self.config.api_version));
        let request = self.client.get(&url).query(&[("key", api_key)]);

        let body = send(ProviderId::Gemini, request, cancel).await?;
        let list: ModelList = decode(&body)?;

        Ok(list
            .models
            .into_iter()
            .filter(|m| m.supported_generation_methods.iter().any(|g| g == "generateContent"))
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect())
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn policy(&self) -> CallPolicy {
        CallPolicy::from(&self.config.settings)
    }

    async fn generate(&self, prompt: &str, max_tokens: u32, cancel: CancellationToken) -> Result<String> {
        let settings = &self.config.settings;
        let api_key = require_credential(settings, ProviderId::Gemini)?;

        let model = self.resolve_model(api_key, &cancel).await;
        let url = settings.endpoint(&format!(
            "{}/models/{}:generateContent",
            self.config.api_version, model
        ));

        debug!("📡 Calling Gemini: {} with model: {}", url, model);

        let request = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&self.body(prompt, max_tokens));

        let body = send(ProviderId::Gemini, request, &cancel).await?;
        parse_response(&body)
    }
}

/// First entry of `preferred` that appears in `available`.
fn pick_model(preferred: &[String], available: &[String]) -> Option<String> {
    preferred
        .iter()
        .find(|p| available.iter().any(|a| a == *p))
        .cloned()
}

/// Concatenates the parts of the first candidate.
///
/// A blocked prompt, a missing candidate, or a safety stop are soft failures.
fn parse_response(body: &str) -> Result<String> {
    let resp: GeminiResponse = decode(body)?;

    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::Blocked(format!("Prompt blocked: {}", reason)));
    }

    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Blocked("No Gemini response".to_string()))?;

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(ProviderError::Blocked("Response blocked by safety filters".to_string()));
    }

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(ProviderError::Blocked("No Gemini response".to_string()));
    }
    Ok(text)
}
