// src/providers/mod.rs

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{Fallback, ProviderSettings};
use crate::deadline;
use crate::errors::{error_message, ProviderError, Result};

pub mod anthropic;
pub mod chat;
pub mod deepseek;
pub mod gemini;
pub mod openai;

/// The fixed set of providers this service knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAI,
    Claude,
    Gemini,
    DeepSeek,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::OpenAI,
        ProviderId::Claude,
        ProviderId::Gemini,
        ProviderId::DeepSeek,
    ];

    /// Key used in JSON payloads and URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::Claude => "claude",
            ProviderId::Gemini => "gemini",
            ProviderId::DeepSeek => "deepseek",
        }
    }

    /// Name shown to humans, e.g. in error strings.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "OpenAI",
            ProviderId::Claude => "Claude",
            ProviderId::Gemini => "Gemini",
            ProviderId::DeepSeek => "DeepSeek",
        }
    }

    pub fn env_prefix(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "OPENAI",
            ProviderId::Claude => "ANTHROPIC",
            ProviderId::Gemini => "GEMINI",
            ProviderId::DeepSeek => "DEEPSEEK",
        }
    }

    /// Name of the variable holding this provider's credential.
    pub fn env_key(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "OPENAI_API_KEY",
            ProviderId::Claude => "ANTHROPIC_API_KEY",
            ProviderId::Gemini => "GEMINI_API_KEY",
            ProviderId::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAI),
            "claude" | "anthropic" => Ok(ProviderId::Claude),
            "gemini" => Ok(ProviderId::Gemini),
            "deepseek" => Ok(ProviderId::DeepSeek),
            other => Err(format!("Unknown provider '{}'", other)),
        }
    }
}

/// How long a provider may take, and what to do when it runs out of time.
#[derive(Debug, Clone, Default)]
pub struct CallPolicy {
    pub max_tokens: u32,
    pub deadline: Option<Duration>,
    pub fallback: Option<Fallback>,
}

impl From<&ProviderSettings> for CallPolicy {
    fn from(settings: &ProviderSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            deadline: settings.deadline,
            fallback: settings.fallback.clone(),
        }
    }
}

/// A common trait for the LLM backends the aggregator fans out to.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn policy(&self) -> CallPolicy;

    /// Makes exactly one attempt at answering `prompt`.
    ///
    /// # Arguments
    /// * `prompt` - Forwarded verbatim to the provider.
    /// * `max_tokens` - Output budget for this attempt.
    /// * `cancel` - Cancelled by the deadline guard; the transport stops as soon as it fires.
    async fn generate(&self, prompt: &str, max_tokens: u32, cancel: CancellationToken) -> Result<String>;
}

/// Runs one provider under its call policy and trims the answer.
///
/// A retryable first failure (timeout, 429, 5xx) triggers the reduced-budget
/// fallback when the provider has one. The fallback's answer wins; if it fails
/// too, the first attempt's error is returned.
pub async fn invoke(provider: &dyn LlmProvider, prompt: &str) -> Result<String> {
    let id = provider.id();
    let policy = provider.policy();

    let first = deadline::guarded(policy.deadline, |cancel| {
        provider.generate(prompt, policy.max_tokens, cancel)
    })
    .await;

    let outcome = match (first, policy.fallback) {
        (Err(first_err), Some(fallback)) if first_err.is_retryable() => {
            warn!(
                "⚠️  {} first attempt failed ({}), retrying with {} tokens",
                id.display_name(),
                first_err,
                fallback.max_tokens
            );
            let second = deadline::guarded(Some(fallback.deadline), |cancel| {
                provider.generate(prompt, fallback.max_tokens, cancel)
            })
            .await;
            match second {
                Ok(text) => Ok(text),
                Err(second_err) => {
                    warn!("⚠️  {} fallback attempt failed: {}", id.display_name(), second_err);
                    Err(first_err)
                }
            }
        }
        (first, _) => first,
    };

    outcome.map(|text| text.trim().to_string())
}

/// Returns the provider's credential or the error naming the variable to set.
pub(crate) fn require_credential(settings: &ProviderSettings, id: ProviderId) -> Result<&str> {
    settings
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(ProviderError::MissingCredential(id.env_key()))
}

/// Sends `request` and returns the body of a successful response.
///
/// Stops early with `Timeout` once `cancel` fires. Non-success statuses become
/// `ProviderError::Http` carrying the best message found in the body.
pub(crate) async fn send(id: ProviderId, request: RequestBuilder, cancel: &CancellationToken) -> Result<String> {
    let start = Instant::now();

    let call = async {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok::<_, ProviderError>((status, body))
    };

    let (status, body) = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("{} call cancelled after {}ms", id.display_name(), start.elapsed().as_millis());
            return Err(ProviderError::Timeout);
        }
        res = call => res?,
    };

    info!(
        "📥 {} response status: {} ({}ms)",
        id.display_name(),
        status,
        start.elapsed().as_millis()
    );

    if !status.is_success() {
        return Err(ProviderError::Http {
            status: status.as_u16(),
            message: error_message(status.as_u16(), &body),
        });
    }

    Ok(body)
}

/// Deserializes a success body, mapping shape mismatches to `MalformedResponse`.
pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("Unexpected response structure: {}", e)))
}
