//! # Matrioska Models
//!
//! Model selection and sampling configuration for the text generator.
//! The pipeline passes these settings through to the provider unmodified.

use serde::{Deserialize, Serialize};

/// Default completion budget, sized for whole-file generation
pub const DEFAULT_MAX_TOKENS: u32 = 20_000;

/// Text generation backends.
///
/// The API key comes from the provider's conventional environment variable
/// (see [`LlmProvider::api_key_var`]). OpenAI also covers any
/// OpenAI-compatible endpoint given through `ModelConfig::base_url`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
    OpenRouter,
    Grok,
    DeepSeek,
}

impl LlmProvider {
    /// Display name, key variable and fallback model
    fn profile(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Anthropic => ("Anthropic", "ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
            Self::OpenAI => ("OpenAI", "OPENAI_API_KEY", "gpt-4o"),
            Self::Gemini => ("Gemini", "GEMINI_API_KEY", "gemini-2.0-flash-exp"),
            Self::OpenRouter => ("OpenRouter", "OPENROUTER_API_KEY", "anthropic/claude-3.5-sonnet"),
            Self::Grok => ("Grok", "XAI_API_KEY", "grok-2"),
            Self::DeepSeek => ("DeepSeek", "DEEPSEEK_API_KEY", "deepseek-chat"),
        }
    }

    pub fn display_name(&self) -> &'static str {
        self.profile().0
    }

    pub fn api_key_var(&self) -> &'static str {
        self.profile().1
    }

    /// Model used when the configuration names none
    pub fn default_model(&self) -> &'static str {
        self.profile().2
    }

    /// Only the OpenAI wire shape honours a custom endpoint
    pub fn supports_base_url(&self) -> bool {
        matches!(self, Self::OpenAI)
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            "openai" => Ok(LlmProvider::OpenAI),
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            "openrouter" => Ok(LlmProvider::OpenRouter),
            "grok" | "xai" => Ok(LlmProvider::Grok),
            "deepseek" => Ok(LlmProvider::DeepSeek),
            other => anyhow::bail!("unknown provider '{}'", other),
        }
    }
}

/// Which model answers generation calls.
///
/// ```rust,ignore
/// use matrioska_core::models::{LlmProvider, ModelConfig};
///
/// let local = ModelConfig::with_provider(LlmProvider::OpenAI, "qwen2.5-coder")
///     .with_base_url("http://localhost:8000/v1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    pub model: String,
    /// Endpoint override for OpenAI-compatible servers
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let provider = LlmProvider::default();
        Self::with_provider(provider, provider.default_model())
    }
}

impl ModelConfig {
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

/// Sampling settings forwarded to the generator.
///
/// Unknown fields are rejected when deserializing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationOptions {
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus-sampling threshold
    pub top_p: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.3,
            top_p: 0.85,
        }
    }
}
