//! Run configuration: defaults, then an optional JSON file, then flags.

use anyhow::{Context, Result};
use clap::Args;
use matrioska_core::models::{LlmProvider, ModelConfig};
use matrioska_core::state::resolve_base_path;
use matrioska_core::swarm::OrchestratorConfig;
use std::path::{Path, PathBuf};

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// What to build
    pub task: String,

    /// JSON file with orchestrator settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// anthropic, openai, gemini, openrouter, grok or deepseek
    #[arg(long)]
    pub provider: Option<String>,

    /// Model name (default depends on the provider)
    #[arg(long)]
    pub model: Option<String>,

    /// OpenAI-compatible endpoint, e.g. a local inference server
    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub top_p: Option<f32>,

    /// Discard checkpoints and synthesize a new plan
    #[arg(long)]
    pub force: bool,

    /// Reject plans whose reads are not written by an earlier file
    #[arg(long)]
    pub strict_reads: bool,

    /// Do not write transcript.log
    #[arg(long)]
    pub no_transcript: bool,
}

/// Read an orchestrator config file
pub async fn load_file(path: &Path) -> Result<OrchestratorConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

impl RunArgs {
    /// Assemble the effective configuration
    pub async fn to_config(&self, base_path: Option<&Path>) -> Result<OrchestratorConfig> {
        let mut config = match &self.config {
            Some(path) => load_file(path).await?,
            None => OrchestratorConfig::default(),
        };
        self.apply(&mut config)?;

        let base = base_path.or(config.base_path.as_deref());
        config.base_path = Some(resolve_base_path(base));
        Ok(config)
    }

    fn apply(&self, config: &mut OrchestratorConfig) -> Result<()> {
        if let Some(provider) = &self.provider {
            let provider: LlmProvider = provider.parse()?;
            if provider != config.model.provider {
                config.model = ModelConfig::with_provider(provider, provider.default_model());
            }
        }
        if let Some(model) = &self.model {
            config.model.model = model.clone();
        }
        if let Some(url) = &self.base_url {
            config.model.base_url = Some(url.clone());
        }

        for options in [&mut config.architect_options, &mut config.artifact_options] {
            if let Some(max_tokens) = self.max_tokens {
                options.max_tokens = max_tokens;
            }
            if let Some(temperature) = self.temperature {
                options.temperature = temperature;
            }
            if let Some(top_p) = self.top_p {
                options.top_p = top_p;
            }
        }

        config.force_architecture |= self.force;
        config.strict_reads |= self.strict_reads;
        if self.no_transcript {
            config.transcript = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(task: &str) -> RunArgs {
        RunArgs {
            task: task.to_string(),
            ..RunArgs::default()
        }
    }

    #[tokio::test]
    async fn test_defaults_without_file_or_flags() {
        let config = args("x")
            .to_config(Some(Path::new("/tmp/run")))
            .await
            .unwrap();
        assert_eq!(config.model, ModelConfig::default());
        assert_eq!(config.artifact_options.max_tokens, 20_000);
        assert_eq!(config.base_path, Some(PathBuf::from("/tmp/run")));
        assert!(config.transcript);
    }

    #[tokio::test]
    async fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrioska.json");
        tokio::fs::write(
            &path,
            r#"{
                "model": {"provider": "openai", "model": "gpt-4o"},
                "artifact_options": {"max_tokens": 4000, "temperature": 0.9},
                "strict_reads": true,
                "base_path": "/srv/from-file"
            }"#,
        )
        .await
        .unwrap();

        let mut run = args("x");
        run.config = Some(path);
        run.temperature = Some(0.1);
        run.base_url = Some("http://localhost:8000/v1".to_string());
        run.no_transcript = true;

        let config = run.to_config(None).await.unwrap();
        assert_eq!(config.model.provider, LlmProvider::OpenAI);
        assert_eq!(config.model.model, "gpt-4o");
        assert_eq!(config.model.base_url.as_deref(), Some("http://localhost:8000/v1"));
        assert_eq!(config.artifact_options.max_tokens, 4000);
        assert_eq!(config.artifact_options.temperature, 0.1);
        assert_eq!(config.architect_options.temperature, 0.1);
        assert!(config.strict_reads);
        assert!(!config.transcript);
        assert_eq!(config.base_path, Some(PathBuf::from("/srv/from-file")));
    }

    #[tokio::test]
    async fn test_provider_flag_picks_its_default_model() {
        let mut run = args("x");
        run.provider = Some("gemini".to_string());
        let config = run.to_config(Some(Path::new("."))).await.unwrap();
        assert_eq!(config.model.provider, LlmProvider::Gemini);
        assert_eq!(config.model.model, LlmProvider::Gemini.default_model());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_an_error() {
        let mut run = args("x");
        run.provider = Some("mystery".to_string());
        assert!(run.to_config(None).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_sampling_field_in_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, r#"{"artifact_options": {"top_k": 40}}"#)
            .await
            .unwrap();

        let err = load_file(&path).await.unwrap_err();
        assert!(format!("{:#}", err).contains("top_k"));
    }
}
