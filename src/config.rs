//! Configuration types for artfuse

use crate::error::{Error, Result};
use crate::llm_client::CompletionClient;
use crate::pipeline::{PromptTemplates, Stage};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Wire protocol a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// `POST <url>` with a chat-completions body, single JSON response
    ChatCompletion,
    /// `POST <base>/api/generate` with a newline-delimited JSON response stream
    LineStreamedGenerate,
}

/// Where and how to reach one backend
#[derive(Clone)]
pub struct ProviderConfig {
    /// Full chat-completions URL, or the base URL of the local model server
    pub endpoint: Url,
    /// Bearer credential; required for chat-completion providers
    pub credential: Option<SecretString>,
    /// Protocol spoken at `endpoint`
    pub protocol: ProtocolKind,
    /// Request timeout
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Create a chat-completion provider configuration
    pub fn chat_completion(endpoint: Url, credential: impl Into<String>) -> Self {
        Self {
            endpoint,
            credential: Some(SecretString::from(credential.into())),
            protocol: ProtocolKind::ChatCompletion,
            timeout: Duration::from_secs(120),
        }
    }

    /// Create a local model server configuration (no credential)
    pub fn local(base_url: Url) -> Self {
        Self {
            endpoint: base_url,
            credential: None,
            protocol: ProtocolKind::LineStreamedGenerate,
            // local streams have no server-side ceiling
            timeout: Duration::from_secs(300),
        }
    }

    /// OpenAI chat completions with the default endpoint
    pub fn openai(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::chat_completion(parse_url(presets::OPENAI_URL)?, api_key))
    }

    /// OpenRouter chat completions with the default endpoint
    pub fn openrouter(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::chat_completion(
            parse_url(presets::OPENROUTER_URL)?,
            api_key,
        ))
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the credential as a string, if any
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_ref().map(|c| c.expose_secret())
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "***REDACTED***"),
            )
            .field("protocol", &self.protocol)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Model and sampling parameters applied to every request a client sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model identifier (e.g., "gpt-4o")
    pub model: String,
    /// Maximum tokens for completion
    pub max_tokens: u32,
    /// Temperature for sampling (0.0-1.0)
    pub temperature: f32,
    /// Nucleus sampling threshold (0.0-1.0)
    pub top_p: f32,
}

impl GenerationConfig {
    /// Create a generation configuration with the default sampling values
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: presets::TOKEN_LIMIT,
            temperature: presets::TEMPERATURE,
            top_p: presets::TOP_P,
        }
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the top-p parameter
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Set the maximum tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Check that sampling values are in range
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::config("model identifier is empty"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Error::config(format!(
                "temperature {} outside [0, 1]",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(Error::config(format!("top_p {} outside [0, 1]", self.top_p)));
        }
        Ok(())
    }
}

/// Backend an operator can run a stage against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// OpenAI chat completions
    OpenAi,
    /// OpenRouter chat completions
    OpenRouter,
    /// Local model server
    Local,
}

/// A hosted provider with its two model roles
#[derive(Debug, Clone)]
pub struct HostedProvider {
    /// Connection settings
    pub provider: ProviderConfig,
    /// Model used for text-only stages
    pub prompt_model: String,
    /// Model used for the image description stage
    pub vision_model: String,
}

impl HostedProvider {
    /// Model for `stage`
    pub fn model_for(&self, stage: Stage) -> &str {
        match stage {
            Stage::ImageDescription => &self.vision_model,
            _ => &self.prompt_model,
        }
    }
}

/// Everything the pipeline needs, loaded from the environment
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// OpenAI settings
    pub openai: HostedProvider,
    /// OpenRouter settings
    pub openrouter: HostedProvider,
    /// Local model server settings
    pub local: ProviderConfig,
    /// Model served by the local server
    pub local_model: String,
    /// Temperature applied to every stage
    pub temperature: f32,
    /// Top-p applied to every stage
    pub top_p: f32,
    /// Token limit applied to every stage
    pub token_limit: u32,
    /// Stage prompt templates
    pub templates: PromptTemplates,
    /// Art styles offered to the operator
    pub art_styles: Vec<String>,
}

impl PipelineConfig {
    /// Load from a `.env` file (if present) and the process environment
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let openai = hosted(
            &get,
            ["OPENAI_API_KEY", "OPENAI_URL", "OPENAI_PROMPT_MODEL", "OPENAI_VISION_MODEL"],
            [
                presets::OPENAI_URL,
                presets::OPENAI_PROMPT_MODEL,
                presets::OPENAI_VISION_MODEL,
            ],
        )?;
        let openrouter = hosted(
            &get,
            [
                "OPENROUTER_API_KEY",
                "OPENROUTER_URL",
                "OPENROUTER_PROMPT_MODEL",
                "OPENROUTER_VISION_MODEL",
            ],
            [
                presets::OPENROUTER_URL,
                presets::OPENROUTER_PROMPT_MODEL,
                presets::OPENROUTER_VISION_MODEL,
            ],
        )?;

        let local = ProviderConfig::local(parse_url(&or("LOCAL_MODEL_URL", presets::LOCAL_URL))?);

        let art_styles = match get("ART_STYLES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => presets::ART_STYLES.iter().map(|s| s.to_string()).collect(),
        };

        let config = Self {
            openai,
            openrouter,
            local,
            local_model: or("LOCAL_MODEL", presets::LOCAL_MODEL),
            temperature: parse_var(&get, "TEMPERATURE", presets::TEMPERATURE)?,
            top_p: parse_var(&get, "TOP_P", presets::TOP_P)?,
            token_limit: parse_var(&get, "TOKEN_LIMIT", presets::TOKEN_LIMIT)?,
            templates: PromptTemplates::from_lookup(&get),
            art_styles,
        };
        config.generation(&config.local_model).validate()?;
        Ok(config)
    }

    /// Build a client for `stage` on `backend`
    ///
    /// Hosted backends use their vision model for image description and their
    /// prompt model otherwise.
    pub fn client(&self, backend: Backend, stage: Stage) -> Result<CompletionClient> {
        let (provider, model) = match backend {
            Backend::OpenAi => (&self.openai.provider, self.openai.model_for(stage)),
            Backend::OpenRouter => (&self.openrouter.provider, self.openrouter.model_for(stage)),
            Backend::Local => (&self.local, self.local_model.as_str()),
        };
        CompletionClient::from_config(provider.clone(), self.generation(model))
    }

    /// Sampling settings for the given model
    pub fn generation(&self, model: &str) -> GenerationConfig {
        GenerationConfig::new(model)
            .with_temperature(self.temperature)
            .with_top_p(self.top_p)
            .with_max_tokens(self.token_limit)
    }
}

/// `keys` = credential, url, prompt model, vision model; `defaults` covers the last three.
fn hosted<G>(get: &G, keys: [&str; 4], defaults: [&str; 3]) -> Result<HostedProvider>
where
    G: Fn(&str) -> Option<String>,
{
    let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
    let provider = ProviderConfig {
        endpoint: parse_url(&or(keys[1], defaults[0]))?,
        credential: get(keys[0]).map(SecretString::from),
        protocol: ProtocolKind::ChatCompletion,
        timeout: Duration::from_secs(120),
    };
    Ok(HostedProvider {
        provider,
        prompt_model: or(keys[2], defaults[1]),
        vision_model: or(keys[3], defaults[2]),
    })
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::config(format!("invalid URL {:?}: {}", raw, e)))
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("{} = {:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

/// Default endpoints, models, and sampling values
pub mod presets {
    /// OpenAI chat completions endpoint
    pub const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

    /// OpenRouter chat completions endpoint
    pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

    /// Local model server base URL
    pub const LOCAL_URL: &str = "http://localhost:11434";

    /// OpenAI text model
    pub const OPENAI_PROMPT_MODEL: &str = "gpt-4o";

    /// OpenAI vision model
    pub const OPENAI_VISION_MODEL: &str = "gpt-4o-mini";

    /// OpenRouter text model
    pub const OPENROUTER_PROMPT_MODEL: &str = "cohere/command-r-08-2024";

    /// OpenRouter vision model
    pub const OPENROUTER_VISION_MODEL: &str = "qwen/qwen-2-vl-7b-instruct";

    /// Local vision-capable model
    pub const LOCAL_MODEL: &str = "llava";

    /// Sampling temperature
    pub const TEMPERATURE: f32 = 0.7;

    /// Nucleus sampling threshold
    pub const TOP_P: f32 = 0.9;

    /// Maximum tokens per request
    pub const TOKEN_LIMIT: u32 = 2048;

    /// Art styles offered when `ART_STYLES` is unset
    pub const ART_STYLES: &[&str] = &[
        "Classic Art",
        "Anime",
        "Cyberpunk",
        "Photorealism",
        "Manga",
        "Pixel Art",
        "Pop Art",
        "Renaissance",
        "Impressionism",
        "Street Photography",
        "Photojournalism",
        "Meme Art",
        "Surrealism",
        "Fantasy",
        "Concept Art",
        "Fantasy Realism",
        "Comic Book Style",
        "Minimalism",
        "Baroque",
        "Cubism",
        "Neo-Expressionism",
        "Abstract Expressionism",
        "Graffiti",
        "Western Art",
        "Postmodernism",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_empty_environment() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.openai.provider.endpoint.as_str(), presets::OPENAI_URL);
        assert!(config.openai.provider.credential().is_none());
        assert_eq!(config.openrouter.vision_model, presets::OPENROUTER_VISION_MODEL);
        assert_eq!(config.local.protocol, ProtocolKind::LineStreamedGenerate);
        assert_eq!(config.token_limit, 2048);
        assert_eq!(config.art_styles.len(), 25);
    }

    #[test]
    fn test_environment_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "sk-or-test"),
            ("TEMPERATURE", "0.2"),
            ("TOKEN_LIMIT", "4096"),
            ("ART_STYLES", "Cubism, Baroque ,,Anime"),
            ("OPENAI_API_KEY", "   "),
        ]))
        .unwrap();
        assert_eq!(config.openrouter.provider.credential(), Some("sk-or-test"));
        assert!(config.openai.provider.credential().is_none());
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.token_limit, 4096);
        assert_eq!(config.art_styles, vec!["Cubism", "Baroque", "Anime"]);

        let generation = config.generation("gpt-4o");
        assert_eq!(generation.max_tokens, 4096);
        assert_eq!(generation.top_p, 0.9);
    }

    #[test]
    fn test_client_per_backend_and_stage() {
        use crate::llm_client::LlmClient;

        let config = PipelineConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        let vision = config.client(Backend::OpenAi, Stage::ImageDescription).unwrap();
        assert_eq!(vision.generation().model, presets::OPENAI_VISION_MODEL);
        let text = config.client(Backend::OpenAi, Stage::PromptCompaction).unwrap();
        assert_eq!(text.generation().model, presets::OPENAI_PROMPT_MODEL);

        let local = config.client(Backend::Local, Stage::ImageDescription).unwrap();
        assert_eq!(local.client_type(), "local");

        // no OpenRouter key configured
        assert!(config.client(Backend::OpenRouter, Stage::StyleDescription).is_err());
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("TOP_P", "lots")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = PipelineConfig::from_lookup(lookup(&[("TEMPERATURE", "1.5")])).unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_generation_validation() {
        assert!(GenerationConfig::new("m").validate().is_ok());
        assert!(GenerationConfig::new("m").with_top_p(-0.1).validate().is_err());
        assert!(GenerationConfig::new(" ").validate().is_err());
    }

    #[test]
    fn test_debug_redacts_credential() {
        let config = ProviderConfig::openai("sk-secret").unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
