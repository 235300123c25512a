//! Text-generation backends
//!
//! Every backend answers one question: given a prompt and a system prompt,
//! return raw text. Which backend is used is decided once, from config.

use crate::error::{EnsureError, EnsureResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(prompt: String, system_prompt: &str) -> Self {
        Self {
            prompt,
            system_prompt: system_prompt.to_string(),
            max_tokens: 1024,
            temperature: 0.0,
        }
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, request: &GenerationRequest) -> EnsureResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    Openai,
    Ollama,
}

impl std::str::FromStr for ProviderKind {
    type Err = EnsureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "openai" | "openai-compatible" => Ok(ProviderKind::Openai),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(EnsureError::Config(format!("unknown provider: {}", other))),
        }
    }
}

/// Provider settings resolved from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            model: None,
            api_key: None,
            base_url: None,
            request_timeout_secs: 120,
        }
    }
}

/// Concrete backends.
pub enum LlmClient {
    Anthropic {
        http: reqwest::Client,
        api_key: String,
        model: String,
        url: String,
    },
    OpenAi {
        http: reqwest::Client,
        api_key: String,
        model: String,
        base_url: String,
    },
    Ollama {
        http: reqwest::Client,
        model: String,
        base_url: String,
    },
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> EnsureResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let client = match config.provider {
            ProviderKind::Anthropic => LlmClient::Anthropic {
                http,
                api_key: require_key(config, "ANTHROPIC_API_KEY")?,
                model: config
                    .model
                    .clone()
                    .unwrap_or_else(|| "claude-3-5-sonnet-latest".to_string()),
                url: config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| ANTHROPIC_URL.to_string()),
            },
            ProviderKind::Openai => LlmClient::OpenAi {
                http,
                api_key: require_key(config, "OPENAI_API_KEY")?,
                model: config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string()),
                base_url: config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| OPENAI_URL.to_string()),
            },
            ProviderKind::Ollama => LlmClient::Ollama {
                http,
                model: config.model.clone().unwrap_or_else(|| "llama3.2".to_string()),
                base_url: config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| OLLAMA_URL.to_string()),
            },
        };
        Ok(client)
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            LlmClient::Anthropic { .. } => "anthropic",
            LlmClient::OpenAi { .. } => "openai",
            LlmClient::Ollama { .. } => "ollama",
        }
    }
}

fn require_key(config: &LlmConfig, env_name: &str) -> EnsureResult<String> {
    config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| EnsureError::Config(format!("{} is not set", env_name)))
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate_text(&self, request: &GenerationRequest) -> EnsureResult<String> {
        let (response, pointer) = match self {
            LlmClient::Anthropic {
                http,
                api_key,
                model,
                url,
            } => {
                let body = serde_json::json!({
                    "model": model,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "system": request.system_prompt,
                    "messages": [{"role": "user", "content": request.prompt}],
                });
                let resp = http
                    .post(url)
                    .header("x-api-key", api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
                    .send()
                    .await?;
                (resp, "/content/0/text")
            }
            LlmClient::OpenAi {
                http,
                api_key,
                model,
                base_url,
            } => {
                let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
                let body = serde_json::json!({
                    "model": model,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "messages": [
                        {"role": "system", "content": request.system_prompt},
                        {"role": "user", "content": request.prompt},
                    ],
                });
                let resp = http.post(&url).bearer_auth(api_key).json(&body).send().await?;
                (resp, "/choices/0/message/content")
            }
            LlmClient::Ollama {
                http,
                model,
                base_url,
            } => {
                let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
                let body = serde_json::json!({
                    "model": model,
                    "system": request.system_prompt,
                    "prompt": request.prompt,
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    },
                });
                let resp = http.post(&url).json(&body).send().await?;
                (resp, "/response")
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnsureError::Generation(format!(
                "{} returned status {}: {}",
                self.provider_name(),
                status,
                truncate(&body, 300)
            )));
        }

        let json: serde_json::Value = response.json().await?;
        extract_text(&json, pointer).ok_or_else(|| {
            EnsureError::Generation(format!(
                "{} response has no text at {}",
                self.provider_name(),
                pointer
            ))
        })
    }
}

fn extract_text(json: &serde_json::Value, pointer: &str) -> Option<String> {
    json.pointer(pointer)
        .and_then(|v| v.as_str())
        .map(String::from)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
