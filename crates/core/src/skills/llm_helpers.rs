//! # LLM Helpers
//!
//! The text-generation boundary and its provider implementations.
//! Provider matching happens once, in [`HttpGenerator::generate`]; the rest
//! of the pipeline only sees [`TextGenerator`].

use crate::models::{GenerationOptions, LlmProvider, ModelConfig};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// One generation call: optional system instruction plus the user prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Anything that turns a prompt into text.
///
/// Options are forwarded as-is; implementations must not mutate shared
/// pipeline state.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        options: &GenerationOptions,
    ) -> Result<String>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate(
        &self,
        request: &GenerationRequest,
        options: &GenerationOptions,
    ) -> Result<String> {
        (**self).generate(request, options).await
    }
}

/// HTTP client for the supported providers
pub struct HttpGenerator {
    client: reqwest::Client,
    config: ModelConfig,
    api_key: Option<String>,
}

impl HttpGenerator {
    /// Build a generator, reading the API key from the provider's variable.
    ///
    /// A custom OpenAI-compatible base URL may run without a key (local
    /// inference servers).
    pub fn from_env(config: &ModelConfig) -> Result<Self> {
        let var = config.provider.api_key_var();
        let api_key = std::env::var(var).ok().filter(|k| !k.trim().is_empty());
        let keyless_allowed = config.provider.supports_base_url() && config.base_url.is_some();
        if api_key.is_none() && !keyless_allowed {
            bail!(
                "{} is not set (required for provider {})",
                var,
                config.provider.display_name()
            );
        }

        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn chat_completions_url(&self) -> String {
        let base = match (&self.config.base_url, self.config.provider) {
            (Some(url), provider) if provider.supports_base_url() => url.as_str(),
            (_, LlmProvider::OpenRouter) => "https://openrouter.ai/api/v1",
            (_, LlmProvider::Grok) => "https://api.x.ai/v1",
            (_, LlmProvider::DeepSeek) => "https://api.deepseek.com/v1",
            _ => "https://api.openai.com/v1",
        };
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    async fn post(&self, request: reqwest::RequestBuilder, body: &Value) -> Result<Value> {
        let response = request
            .json(body)
            .send()
            .await
            .with_context(|| format!("{} request failed", self.config.provider.display_name()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .context("Provider returned a non-JSON response")?;

        if !status.is_success() {
            let message = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string());
            bail!(
                "{} returned {}: {}",
                self.config.provider.display_name(),
                status,
                message
            );
        }
        Ok(payload)
    }

    async fn anthropic(
        &self,
        request: &GenerationRequest,
        options: &GenerationOptions,
    ) -> Result<String> {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "top_p": options.top_p,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }

        let builder = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", self.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", "2023-06-01");
        let payload = self.post(builder, &body).await?;

        let text = payload
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| anyhow!("Anthropic response has no content blocks"))?;
        Ok(text)
    }

    async fn gemini(
        &self,
        request: &GenerationRequest,
        options: &GenerationOptions,
    ) -> Result<String> {
        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
            "generationConfig": {
                "maxOutputTokens": options.max_tokens,
                "temperature": options.temperature,
                "topP": options.top_p,
            },
        });
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.config.model
        );
        let builder = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.as_deref().unwrap_or_default());
        let payload = self.post(builder, &body).await?;

        let text = payload
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| anyhow!("Gemini response has no candidates"))?;
        Ok(text)
    }

    async fn chat_completions(
        &self,
        request: &GenerationRequest,
        options: &GenerationOptions,
    ) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "top_p": options.top_p,
        });

        let mut builder = self.client.post(self.chat_completions_url());
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let payload = self.post(builder, &body).await?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("chat completion response has no message content"))
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        options: &GenerationOptions,
    ) -> Result<String> {
        let text = match self.config.provider {
            LlmProvider::Anthropic => self.anthropic(request, options).await?,
            LlmProvider::Gemini => self.gemini(request, options).await?,
            LlmProvider::OpenAI
            | LlmProvider::OpenRouter
            | LlmProvider::Grok
            | LlmProvider::DeepSeek => self.chat_completions(request, options).await?,
        };

        non_empty(text, &self.config)
    }
}

/// Completion text as returned, unless it is blank
fn non_empty(text: String, config: &ModelConfig) -> Result<String> {
    if text.trim().is_empty() {
        bail!(
            "{} ({}) returned an empty completion",
            config.provider.display_name(),
            config.model
        );
    }
    Ok(text)
}

/// Decorator that appends every prompt and response to a transcript file.
///
/// Transcript failures are logged and never fail the generation.
pub struct TranscriptGenerator<G> {
    inner: G,
    path: PathBuf,
}

impl<G: TextGenerator> TranscriptGenerator<G> {
    pub fn new(inner: G, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
        }
    }

    async fn append(&self, request: &GenerationRequest, response: &str) -> Result<()> {
        const RULE: &str = "==========================================";
        let prompt = match &request.system {
            Some(system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt.clone(),
        };
        let entry = format!(
            "PROMPT:\n{rule}\n\n{prompt}\n{rule}\nRESULT:\n{rule}\n\n{response}\n\n\n\n",
            rule = RULE,
            prompt = prompt,
            response = response
        );

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open transcript: {:?}", self.path))?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<G: TextGenerator> TextGenerator for TranscriptGenerator<G> {
    async fn generate(
        &self,
        request: &GenerationRequest,
        options: &GenerationOptions,
    ) -> Result<String> {
        let response = self.inner.generate(request, options).await?;
        if let Err(e) = self.append(request, &response).await {
            tracing::warn!(path = ?self.path, "Transcript write failed: {:#}", e);
        }
        Ok(response)
    }
}

/// Create the generator for a model configuration
pub fn create_generator(config: &ModelConfig) -> Result<Arc<dyn TextGenerator>> {
    tracing::debug!(
        provider = config.provider.display_name(),
        model = %config.model,
        "Creating text generator"
    );
    Ok(Arc::new(HttpGenerator::from_env(config)?))
}
