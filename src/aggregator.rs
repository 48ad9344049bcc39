// src/aggregator.rs
use futures::future::{self, FutureExt};
use log::{error, info, warn};
use reqwest::Client;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::{CompareError, ProviderError, Result};
use crate::providers::{
    anthropic::AnthropicProvider, deepseek::DeepSeekProvider, gemini::GeminiProvider,
    invoke, openai::OpenAIProvider, LlmProvider, ProviderId,
};

/// Side-by-side answers for one prompt.
///
/// Every active provider gets exactly one string field, holding either its
/// answer or a readable error. Optional providers that were not requested
/// have no field at all.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ComparePayload {
    pub prompt: String,
    #[serde(flatten)]
    pub answers: BTreeMap<ProviderId, String>,
}

/// Per-request choices about which providers to run.
#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    /// Optional providers to run in addition to the core set.
    pub include_optional: BTreeSet<ProviderId>,
}

impl CompareOptions {
    /// Options matching the public `withGemini` request flag.
    pub fn with_gemini(enabled: bool) -> Self {
        let mut options = Self::default();
        if enabled {
            options.include_optional.insert(ProviderId::Gemini);
        }
        options
    }
}

struct Registered {
    provider: Arc<dyn LlmProvider>,
    optional: bool,
}

/// Fans a prompt out to every active provider and collects the answers.
#[derive(Default)]
pub struct Aggregator {
    providers: Vec<Registered>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the core and optional providers named in `config`.
    pub fn from_config(config: &AppConfig, client: &Client) -> Self {
        let mut aggregator = Self::new();
        for id in &config.core_providers {
            aggregator.register(build_provider(*id, config, client), false);
        }
        for id in &config.optional_providers {
            aggregator.register(build_provider(*id, config, client), true);
        }
        aggregator
    }

    /// Adds a provider. A later registration with the same id replaces the earlier one.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>, optional: bool) -> &mut Self {
        let id = provider.id();
        self.providers.retain(|r| r.provider.id() != id);
        self.providers.push(Registered { provider, optional });
        self
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|r| r.provider.id()).collect()
    }

    pub fn is_optional(&self, id: ProviderId) -> bool {
        self.providers
            .iter()
            .any(|r| r.optional && r.provider.id() == id)
    }

    fn active<'a>(&'a self, options: &'a CompareOptions) -> impl Iterator<Item = &'a Arc<dyn LlmProvider>> + 'a {
        self.providers
            .iter()
            .filter(move |r| !r.optional || options.include_optional.contains(&r.provider.id()))
            .map(|r| &r.provider)
    }

    /// Asks every active provider concurrently and waits for all of them.
    ///
    /// Provider failures never fail the call; they end up as text in the
    /// provider's field. The only error is having nothing to ask.
    pub async fn compare(&self, prompt: &str, options: &CompareOptions) -> std::result::Result<ComparePayload, CompareError> {
        let request_id = Uuid::new_v4();
        let active: Vec<Arc<dyn LlmProvider>> = self.active(options).cloned().collect();
        if active.is_empty() {
            return Err(CompareError::NoProviders);
        }

        let start = Instant::now();
        info!(
            "🎯 [{}] Comparing {} providers: {:?}",
            request_id,
            active.len(),
            active.iter().map(|p| p.id().as_str()).collect::<Vec<_>>()
        );

        let calls = active
            .iter()
            .map(|provider| settle(request_id, provider.as_ref(), prompt));
        let settled = future::join_all(calls).await;

        let answers: BTreeMap<ProviderId, String> = active
            .iter()
            .map(|p| p.id())
            .zip(settled)
            .collect();

        info!(
            "📊 [{}] All {} providers settled in {}ms",
            request_id,
            answers.len(),
            start.elapsed().as_millis()
        );

        Ok(ComparePayload {
            prompt: prompt.to_string(),
            answers,
        })
    }

    /// Asks a single registered provider, optional or not.
    pub async fn ask(&self, id: ProviderId, prompt: &str) -> Option<String> {
        let registered = self.providers.iter().find(|r| r.provider.id() == id)?;
        Some(settle(Uuid::new_v4(), registered.provider.as_ref(), prompt).await)
    }
}

/// Constructs the adapter for `id` from its section of the configuration.
pub fn build_provider(id: ProviderId, config: &AppConfig, client: &Client) -> Arc<dyn LlmProvider> {
    match id {
        ProviderId::OpenAI => Arc::new(OpenAIProvider::new(client.clone(), config.openai.clone())),
        ProviderId::Claude => Arc::new(AnthropicProvider::new(client.clone(), config.anthropic.clone())),
        ProviderId::Gemini => Arc::new(GeminiProvider::new(client.clone(), config.gemini.clone())),
        ProviderId::DeepSeek => Arc::new(DeepSeekProvider::new(client.clone(), config.deepseek.clone())),
    }
}

/// Text shown in place of an answer that ran out of time.
pub fn timeout_text(id: ProviderId) -> String {
    format!(
        "{} timed out (kept answer short; try re-asking for more detail).",
        id.display_name()
    )
}

/// Collapses a provider outcome into the string placed in the payload.
pub fn display(id: ProviderId, result: Result<String>) -> String {
    match result {
        Ok(text) => text,
        Err(ProviderError::Timeout) => timeout_text(id),
        Err(e) => format!("{} error: {}", id.display_name(), e),
    }
}

/// Runs one provider to completion, panics included, and renders the outcome.
async fn settle(request_id: Uuid, provider: &dyn LlmProvider, prompt: &str) -> String {
    let id = provider.id();
    let start = Instant::now();

    match AssertUnwindSafe(invoke(provider, prompt)).catch_unwind().await {
        Ok(Ok(text)) => {
            info!("✅ [{}] {} answered ({}ms)", request_id, id.display_name(), start.elapsed().as_millis());
            text
        }
        Ok(Err(e)) => {
            warn!("❌ [{}] {} failed ({}ms): {}", request_id, id.display_name(), start.elapsed().as_millis(), e);
            display(id, Err(e))
        }
        Err(_) => {
            error!("❌ [{}] {} panicked", request_id, id.display_name());
            format!("{} error: unexpected failure", id.display_name())
        }
    }
}
