use super::events::EventEmitter;
use crate::utils::config::{Config, InteractionPolicy};
use std::path::PathBuf;

/// Run-wide settings and sinks shared by every page test and flow.
pub struct RunContext {
    pub session_id: String,

    /// Deployment base every route is joined onto
    pub base_url: String,

    /// Output directory for screenshots and reports
    pub output_dir: PathBuf,

    /// Shared navigation/execution timeout
    pub timeout_ms: u64,

    pub html_budget: usize,

    pub max_tokens: u32,

    pub temperature: f32,

    pub interaction_policy: InteractionPolicy,

    pub events: EventEmitter,
}

impl RunContext {
    pub fn new(config: &Config, events: EventEmitter) -> Self {
        // Reports and screenshots are best effort; a missing directory
        // surfaces later as a per-artifact error.
        let _ = std::fs::create_dir_all(config.screenshots_dir());

        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            base_url: config.base_url.clone(),
            output_dir: config.output_dir.clone(),
            timeout_ms: config.timeout_ms,
            html_budget: config.html_budget,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            interaction_policy: config.interaction_policy,
            events,
        }
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.output_dir.join("screenshots")
    }

    /// `<output>/screenshots/<scope>-<name>.png`, with both parts sanitized.
    pub fn screenshot_path(&self, scope: &str, name: &str) -> PathBuf {
        self.screenshots_dir().join(format!(
            "{}-{}.png",
            sanitize_file_name(scope),
            sanitize_file_name(name)
        ))
    }
}

/// Lowercase, `[a-z0-9-]` only, at most 60 characters.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed: String = out.trim_end_matches('-').chars().take(60).collect();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed
    }
}
