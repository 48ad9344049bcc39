// src/config.rs
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::CompareError;
use crate::providers::ProviderId;

type Result<T> = std::result::Result<T, CompareError>;

/// Prompt used when the caller sends none, or an empty one.
pub const DEFAULT_PROMPT: &str = "Say hello briefly.";

/// Second, reduced-budget attempt made after the first one times out or is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback {
    pub max_tokens: u32,
    pub deadline: Duration,
}

/// Settings every provider shares: where to call, with what, and how long to wait.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub web_search: bool,
    /// `None` leaves the call bounded only by the HTTP runtime.
    pub deadline: Option<Duration>,
    pub fallback: Option<Fallback>,
}

impl ProviderSettings {
    fn new(api_base: &str, model: &str, max_tokens: u32, deadline_secs: u64) -> Self {
        Self {
            api_base: api_base.to_string(),
            api_key: None,
            model: model.to_string(),
            max_tokens,
            temperature: None,
            web_search: false,
            deadline: Some(Duration::from_secs(deadline_secs)),
            fallback: None,
        }
    }

    /// Joins `path` onto the configured base without doubling slashes.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// Which OpenAI endpoint family to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIApiStyle {
    /// `POST /responses` with a single `input` string.
    Responses,
    /// `POST /chat/completions` with a messages array.
    Chat,
}

impl FromStr for OpenAIApiStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "responses" => Ok(OpenAIApiStyle::Responses),
            "chat" => Ok(OpenAIApiStyle::Chat),
            other => Err(format!("unknown OpenAI API style '{}'", other)),
        }
    }
}

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub settings: ProviderSettings,
    pub api_style: OpenAIApiStyle,
}

/// Configuration for the Anthropic provider.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub settings: ProviderSettings,
    pub version: String,
}

/// Configuration for the Gemini provider.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub settings: ProviderSettings,
    pub api_version: String,
    pub top_p: Option<f32>,
    /// List the account's models before generating and pick from `preferred_models`.
    pub discover_models: bool,
    pub preferred_models: Vec<String>,
}

/// Configuration for the DeepSeek provider.
#[derive(Debug, Clone)]
pub struct DeepSeekConfig {
    pub settings: ProviderSettings,
    pub system_prompt: Option<String>,
    pub top_p: Option<f32>,
}

/// HTTP listener and CORS settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to call from a browser. The first one is canonical.
    pub allowed_origins: Vec<String>,
    /// Largest request body accepted by the compare endpoints.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Origin sent back to callers that are not on the allow-list.
    pub fn canonical_origin(&self) -> &str {
        self.allowed_origins
            .first()
            .map(String::as_str)
            .unwrap_or("http://localhost:3000")
    }
}

/// High-level application configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openai: OpenAIConfig,
    pub anthropic: AnthropicConfig,
    pub gemini: GeminiConfig,
    pub deepseek: DeepSeekConfig,
    /// Providers queried on every compare request.
    pub core_providers: Vec<ProviderId>,
    /// Providers queried only when the caller asks for them.
    pub optional_providers: Vec<ProviderId>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut anthropic = ProviderSettings::new("https://api.anthropic.com", "claude-3-5-sonnet-20241022", 1024, 22);
        anthropic.temperature = Some(0.7);

        let mut gemini = ProviderSettings::new("https://generativelanguage.googleapis.com", "gemini-2.0-flash", 1024, 10);
        gemini.temperature = Some(0.7);

        let mut deepseek = ProviderSettings::new("https://api.deepseek.com/v1", "deepseek-chat", 320, 20);
        deepseek.temperature = Some(0.2);
        deepseek.fallback = Some(Fallback {
            max_tokens: 160,
            deadline: Duration::from_secs(10),
        });

        AppConfig {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                allowed_origins: vec!["http://localhost:3000".to_string()],
                max_body_bytes: 2 * 1024 * 1024,
            },
            openai: OpenAIConfig {
                settings: ProviderSettings::new("https://api.openai.com/v1", "gpt-4.1-mini", 1024, 22),
                api_style: OpenAIApiStyle::Responses,
            },
            anthropic: AnthropicConfig {
                settings: anthropic,
                version: "2023-06-01".to_string(),
            },
            gemini: GeminiConfig {
                settings: gemini,
                api_version: "v1beta".to_string(),
                top_p: Some(0.9),
                discover_models: false,
                preferred_models: vec![
                    "gemini-2.5-flash".to_string(),
                    "gemini-2.0-flash".to_string(),
                    "gemini-1.5-flash".to_string(),
                ],
            },
            deepseek: DeepSeekConfig {
                settings: deepseek,
                system_prompt: Some(
                    "Answer concisely in about 120–200 words. \
                     Do not over-explain or enumerate every nuance unless asked."
                        .to_string(),
                ),
                top_p: Some(0.9),
            },
            core_providers: vec![ProviderId::OpenAI, ProviderId::Claude, ProviderId::DeepSeek],
            optional_providers: vec![ProviderId::Gemini],
        }
    }
}

/// Optional TOML file pointed at by `COMPARE_CONFIG`.
#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    server: ServerSection,
    providers: ProvidersSection,
    openai: ProviderSection,
    anthropic: ProviderSection,
    gemini: ProviderSection,
    deepseek: ProviderSection,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
    allowed_origins: Option<Vec<String>>,
    max_body_bytes: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
struct ProvidersSection {
    core: Option<Vec<ProviderId>>,
    optional: Option<Vec<ProviderId>>,
}

/// Per-provider overrides. Credentials are deliberately not accepted here.
#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
struct ProviderSection {
    api_base: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    web_search: Option<bool>,
    deadline_secs: Option<u64>,
    fallback_max_tokens: Option<u32>,
    fallback_deadline_secs: Option<u64>,
    api_style: Option<OpenAIApiStyle>,
    discover_models: Option<bool>,
    preferred_models: Option<Vec<String>>,
    system_prompt: Option<String>,
}

impl AppConfig {
    /// Load configuration from the process environment (and `COMPARE_CONFIG`, if set).
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Precedence is defaults, then the TOML file named by `COMPARE_CONFIG`,
    /// then individual variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(path) = lookup("COMPARE_CONFIG").filter(|p| !p.trim().is_empty()) {
            let text = std::fs::read_to_string(path.trim())?;
            config.apply_toml(&text)?;
        }

        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the contents of a TOML config file.
    pub fn apply_toml(&mut self, text: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(text)?;

        if let Some(host) = file.server.host {
            self.server.host = host;
        }
        if let Some(port) = file.server.port {
            self.server.port = port;
        }
        if let Some(origins) = file.server.allowed_origins {
            self.server.allowed_origins = origins;
        }
        if let Some(limit) = file.server.max_body_bytes {
            self.server.max_body_bytes = limit;
        }
        if let Some(core) = file.providers.core {
            self.core_providers = core;
        }
        if let Some(optional) = file.providers.optional {
            self.optional_providers = optional;
        }

        apply_section(&mut self.openai.settings, &file.openai);
        if let Some(style) = file.openai.api_style {
            self.openai.api_style = style;
        }

        apply_section(&mut self.anthropic.settings, &file.anthropic);

        apply_section(&mut self.gemini.settings, &file.gemini);
        if let Some(discover) = file.gemini.discover_models {
            self.gemini.discover_models = discover;
        }
        if let Some(preferred) = file.gemini.preferred_models {
            self.gemini.preferred_models = preferred;
        }

        apply_section(&mut self.deepseek.settings, &file.deepseek);
        if let Some(system_prompt) = file.deepseek.system_prompt {
            self.deepseek.system_prompt = Some(system_prompt).filter(|s| !s.trim().is_empty());
        }

        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = non_empty(lookup("HOST")) {
            self.server.host = host;
        }
        if let Some(port) = parse_var::<u16, F>(lookup, "PORT")? {
            self.server.port = port;
        }
        if let Some(origins) = non_empty(lookup("ALLOWED_ORIGINS")) {
            self.server.allowed_origins = split_list(&origins);
        }
        if let Some(limit) = parse_var::<usize, F>(lookup, "MAX_BODY_BYTES")? {
            self.server.max_body_bytes = limit;
        }

        apply_env_settings(&mut self.openai.settings, ProviderId::OpenAI, lookup)?;
        if let Some(style) = non_empty(lookup("OPENAI_API_STYLE")) {
            self.openai.api_style = style.parse().map_err(CompareError::Config)?;
        }

        apply_env_settings(&mut self.anthropic.settings, ProviderId::Claude, lookup)?;

        apply_env_settings(&mut self.gemini.settings, ProviderId::Gemini, lookup)?;
        if let Some(discover) = parse_flag(lookup, "GEMINI_DISCOVER_MODELS")? {
            self.gemini.discover_models = discover;
        }

        apply_env_settings(&mut self.deepseek.settings, ProviderId::DeepSeek, lookup)?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.core_providers.is_empty() && self.optional_providers.is_empty() {
            return Err(CompareError::Config("at least one provider must be enabled".to_string()));
        }
        if let Some(id) = self.core_providers.iter().find(|id| self.optional_providers.contains(id)) {
            return Err(CompareError::Config(format!(
                "provider '{}' is listed as both core and optional",
                id
            )));
        }
        if self.server.allowed_origins.is_empty() {
            return Err(CompareError::Config("ALLOWED_ORIGINS must name at least one origin".to_string()));
        }
        if self.server.max_body_bytes == 0 {
            return Err(CompareError::Config("MAX_BODY_BYTES must be positive".to_string()));
        }
        Ok(())
    }

    /// Settings for one provider.
    pub fn settings(&self, id: ProviderId) -> &ProviderSettings {
        match id {
            ProviderId::OpenAI => &self.openai.settings,
            ProviderId::Claude => &self.anthropic.settings,
            ProviderId::Gemini => &self.gemini.settings,
            ProviderId::DeepSeek => &self.deepseek.settings,
        }
    }
}

fn apply_section(settings: &mut ProviderSettings, section: &ProviderSection) {
    if let Some(api_base) = &section.api_base {
        settings.api_base = api_base.clone();
    }
    if let Some(model) = &section.model {
        settings.model = model.clone();
    }
    if let Some(max_tokens) = section.max_tokens {
        settings.max_tokens = max_tokens;
    }
    if let Some(temperature) = section.temperature {
        settings.temperature = Some(temperature);
    }
    if let Some(web_search) = section.web_search {
        settings.web_search = web_search;
    }
    if let Some(secs) = section.deadline_secs {
        settings.deadline = deadline_from_secs(secs);
    }
    apply_fallback(settings, section.fallback_max_tokens, section.fallback_deadline_secs);
}

fn apply_env_settings<F>(settings: &mut ProviderSettings, id: ProviderId, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = id.env_prefix();
    let key = |suffix: &str| format!("{}_{}", prefix, suffix);

    if let Some(api_key) = non_empty(lookup(id.env_key())) {
        settings.api_key = Some(api_key);
    }
    if let Some(api_base) = non_empty(lookup(&key("API_BASE"))) {
        settings.api_base = api_base;
    }
    if let Some(model) = non_empty(lookup(&key("MODEL"))) {
        settings.model = model;
    }
    if let Some(max_tokens) = parse_var::<u32, F>(lookup, &key("MAX_TOKENS"))? {
        settings.max_tokens = max_tokens;
    }
    if let Some(temperature) = parse_var::<f32, F>(lookup, &key("TEMPERATURE"))? {
        settings.temperature = Some(temperature);
    }
    if let Some(web_search) = parse_flag(lookup, &key("WEB_SEARCH"))? {
        settings.web_search = web_search;
    }
    if let Some(secs) = parse_var::<u64, F>(lookup, &key("DEADLINE_SECS"))? {
        settings.deadline = deadline_from_secs(secs);
    }
    let fallback_tokens = parse_var::<u32, F>(lookup, &key("FALLBACK_MAX_TOKENS"))?;
    let fallback_secs = parse_var::<u64, F>(lookup, &key("FALLBACK_DEADLINE_SECS"))?;
    apply_fallback(settings, fallback_tokens, fallback_secs);

    Ok(())
}

/// `max_tokens = 0` switches the fallback off; otherwise fields are merged
/// into the existing fallback, or into a new one with a 10s deadline.
fn apply_fallback(settings: &mut ProviderSettings, max_tokens: Option<u32>, deadline_secs: Option<u64>) {
    if max_tokens == Some(0) {
        settings.fallback = None;
        return;
    }
    if max_tokens.is_none() && deadline_secs.is_none() {
        return;
    }

    let mut fallback = settings.fallback.clone().unwrap_or(Fallback {
        max_tokens: (settings.max_tokens / 2).max(1),
        deadline: Duration::from_secs(10),
    });
    if let Some(max_tokens) = max_tokens {
        fallback.max_tokens = max_tokens;
    }
    if let Some(secs) = deadline_secs.filter(|s| *s > 0) {
        fallback.deadline = Duration::from_secs(secs);
    }
    settings.fallback = Some(fallback);
}

fn deadline_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup(key)) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| CompareError::Config(format!("{} has an invalid value '{}'", key, raw))),
        None => Ok(None),
    }
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup(key)).map(|v| v.to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(Some(false)),
        Some(v) => Err(CompareError::Config(format!("{} has an invalid value '{}'", key, v))),
    }
}
