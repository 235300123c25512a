use crate::driver::BrowserType;
use crate::error::{EnsureError, EnsureResult};
use crate::llm::{LlmConfig, ProviderKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Whether a page expectation that reads as a static check may be compiled
/// into a program that interacts with the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionPolicy {
    #[default]
    Allow,
    DenyForStatic,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Project whose page sources and flow documents are scanned
    pub project_root: PathBuf,

    /// Deployment the checks run against, e.g. `https://preview.example.dev`
    pub base_url: String,

    /// Shared navigation and execution timeout (ms)
    pub timeout_ms: u64,

    pub headless: bool,

    pub browser: BrowserType,

    /// Explicit browser binary (Chromium only)
    pub browser_executable: Option<PathBuf>,

    /// Output directory for reports and screenshots
    pub output_dir: PathBuf,

    /// Flow documents directory; `<project_root>/flows` when unset
    pub flows_dir: Option<PathBuf>,

    pub llm: LlmConfig,

    pub interaction_policy: InteractionPolicy,

    /// Maximum characters of reduced HTML sent to the generator
    pub html_budget: usize,

    pub max_tokens: u32,

    pub temperature: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            base_url: "http://localhost:3000".to_string(),
            timeout_ms: 15000,
            headless: true,
            browser: BrowserType::Chromium,
            browser_executable: None,
            output_dir: PathBuf::from("./ensure-ui-output"),
            flows_dir: None,
            llm: LlmConfig::default(),
            interaction_policy: InteractionPolicy::Allow,
            html_budget: 30_000,
            max_tokens: 1024,
            temperature: 0.0,
        }
    }
}

impl Config {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> EnsureResult<Self> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlay values found through `lookup` (an environment reader).
    pub fn with_env<F>(mut self, lookup: F) -> EnsureResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("ENSURE_UI_BASE_URL") {
            self.base_url = url;
        }
        if let Some(raw) = get("ENSURE_UI_TIMEOUT_MS") {
            self.timeout_ms = raw.trim().parse().map_err(|_| {
                EnsureError::Config(format!("ENSURE_UI_TIMEOUT_MS is not a number: {}", raw))
            })?;
        }
        if let Some(raw) = get("ENSURE_UI_HEADLESS") {
            self.headless = parse_bool("ENSURE_UI_HEADLESS", &raw)?;
        }
        if let Some(raw) = get("ENSURE_UI_BROWSER") {
            self.browser = <BrowserType as clap::ValueEnum>::from_str(raw.trim(), true)
                .map_err(|_| {
                    EnsureError::Config(format!(
                        "ENSURE_UI_BROWSER must be chromium, firefox or webkit: {}",
                        raw
                    ))
                })?;
        }
        if let Some(raw) = get("ENSURE_UI_RESTRICT_STATIC") {
            self.interaction_policy = if parse_bool("ENSURE_UI_RESTRICT_STATIC", &raw)? {
                InteractionPolicy::DenyForStatic
            } else {
                InteractionPolicy::Allow
            };
        }
        if let Some(raw) = get("ENSURE_UI_PROVIDER") {
            self.llm.provider = raw.parse()?;
        }
        if let Some(model) = get("ENSURE_UI_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(base) = get("ENSURE_UI_LLM_BASE_URL") {
            self.llm.base_url = Some(base);
        }
        if let Some(path) = get("PLAYWRIGHT_CHROMIUM_EXECUTABLE_PATH") {
            self.browser_executable = Some(PathBuf::from(path));
        }

        self.llm.api_key = match self.llm.provider {
            ProviderKind::Anthropic => get("ANTHROPIC_API_KEY"),
            ProviderKind::Openai => get("OPENAI_API_KEY"),
            ProviderKind::Ollama => None,
        }
        .or(self.llm.api_key.take());

        Ok(self)
    }

    /// Reject settings that would make every unit fail.
    pub fn validate(&self) -> EnsureResult<()> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(EnsureError::Config(format!(
                "base URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(EnsureError::Config("timeout must be greater than 0".into()));
        }
        if self.html_budget == 0 {
            return Err(EnsureError::Config("HTML budget must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn flows_path(&self) -> PathBuf {
        self.flows_dir
            .clone()
            .unwrap_or_else(|| self.project_root.join("flows"))
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.output_dir.join("screenshots")
    }
}

fn parse_bool(key: &str, raw: &str) -> EnsureResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(EnsureError::Config(format!("{} is not a boolean: {}", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timeout_ms, 15000);
        assert!(config.headless);
        assert_eq!(config.browser, BrowserType::Chromium);
        assert_eq!(config.interaction_policy, InteractionPolicy::Allow);
        assert_eq!(config.flows_path(), PathBuf::from("./flows"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_env(env(&[
                ("ENSURE_UI_BASE_URL", "https://preview.acme.dev"),
                ("ENSURE_UI_TIMEOUT_MS", "5000"),
                ("ENSURE_UI_HEADLESS", "false"),
                ("ENSURE_UI_BROWSER", "Firefox"),
                ("ENSURE_UI_RESTRICT_STATIC", "1"),
                ("ENSURE_UI_PROVIDER", "openai"),
                ("OPENAI_API_KEY", "sk-test"),
                ("ANTHROPIC_API_KEY", "ignored"),
            ]))
            .unwrap();

        assert_eq!(config.base_url, "https://preview.acme.dev");
        assert_eq!(config.timeout_ms, 5000);
        assert!(!config.headless);
        assert_eq!(config.browser, BrowserType::Firefox);
        assert_eq!(config.interaction_policy, InteractionPolicy::DenyForStatic);
        assert_eq!(config.llm.provider, ProviderKind::Openai);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_bad_env_values_are_config_errors() {
        let err = Config::default()
            .with_env(env(&[("ENSURE_UI_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, EnsureError::Config(_)));

        let err = Config::default()
            .with_env(env(&[("ENSURE_UI_HEADLESS", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, EnsureError::Config(_)));

        let err = Config::default()
            .with_env(env(&[("ENSURE_UI_BROWSER", "netscape")]))
            .unwrap_err();
        assert!(err.to_string().contains("ENSURE_UI_BROWSER"));
    }

    #[test]
    fn test_validate_rejects_non_http_base() {
        let config = Config {
            base_url: "preview.acme.dev".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EnsureError::Config(_))));
    }
}
