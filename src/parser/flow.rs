//! Flow document parser
//!
//! ```text
//! # Checkout
//! > Buys the first product as a signed-in user
//! @email = "shopper@example.com"
//! 1. Go to /login
//! 2. Fill in email field with @email and submit
//! 3. Visit /cart and see one item
//! ```
//!
//! Headings start a new flow, `>` lines extend its description, `@name = value`
//! declares a variable and numbered lines become steps. Fenced code blocks are
//! skipped.

use super::types::{FlowDefinition, FlowStep};
use crate::error::{EnsureError, EnsureResult};
use anyhow::Context;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#\s+(.+?)\s*#*\s*$").unwrap())
}

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@([A-Za-z_][A-Za-z0-9_\-]*)\s*=\s*(.*)$").unwrap())
}

fn step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)[.)]\s+(.+)$").unwrap())
}

fn navigation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)\b(?:navigates?\s+to|go(?:es)?\s+to|visits?|on\s+(?:the\s+)?page|opens?)\s+(?:the\s+)?(?:page\s+)?[`"']?(https?://[^\s`"',;)]+|/[^\s`"',;)]*)"#,
        )
        .unwrap()
    })
}

/// Extract the navigation target from a step's text, if it names one.
pub fn extract_step_url(text: &str) -> Option<String> {
    let caps = navigation_re().captures(text)?;
    let url = caps.get(1)?.as_str().trim_end_matches(['.', ':', '!', '?']);
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

fn strip_quotes(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\'', '`'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Parse a flow document from disk.
pub fn parse_flow_file(path: &Path) -> anyhow::Result<Vec<FlowDefinition>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read flow file: {}", path.display()))?;

    let default_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "flow".to_string());

    let mut flows = parse_flow_document(&content, &default_name)?;
    for flow in &mut flows {
        flow.source_path = Some(path.display().to_string());
    }
    Ok(flows)
}

/// Parse every flow in a document.
///
/// Content appearing before the first heading belongs to a flow named
/// `default_name`. Flows without steps are dropped.
pub fn parse_flow_document(content: &str, default_name: &str) -> EnsureResult<Vec<FlowDefinition>> {
    let mut flows = Vec::new();
    let mut current: Option<FlowDefinition> = None;
    let mut fence_opened_at: Option<usize> = None;

    for (line_idx, raw) in content.lines().enumerate() {
        let line = raw.trim();

        if line.starts_with("```") {
            fence_opened_at = match fence_opened_at {
                Some(_) => None,
                None => Some(line_idx + 1),
            };
            continue;
        }
        if fence_opened_at.is_some() || line.is_empty() {
            continue;
        }

        if let Some(caps) = heading_re().captures(line) {
            if let Some(done) = current.take() {
                emit(&mut flows, done);
            }
            current = Some(FlowDefinition::new(&caps[1]));
            continue;
        }

        let flow = current.get_or_insert_with(|| FlowDefinition::new(default_name));

        if let Some(quote) = line.strip_prefix('>') {
            let quote = quote.trim();
            if !quote.is_empty() {
                if !flow.description.is_empty() {
                    flow.description.push(' ');
                }
                flow.description.push_str(quote);
            }
        } else if let Some(caps) = variable_re().captures(line) {
            flow.variables
                .insert(caps[1].to_string(), strip_quotes(&caps[2]).to_string());
        } else if let Some(caps) = step_re().captures(line) {
            let text = caps[2].trim();
            let index = flow.steps.len() + 1;
            flow.steps
                .push(FlowStep::new(index, text, extract_step_url(text)));
        }
    }

    if let Some(line) = fence_opened_at {
        return Err(EnsureError::Parse(format!(
            "unterminated code fence opened at line {}",
            line
        )));
    }

    if let Some(done) = current.take() {
        emit(&mut flows, done);
    }

    Ok(flows)
}

fn emit(flows: &mut Vec<FlowDefinition>, flow: FlowDefinition) {
    if flow.steps.is_empty() {
        log::warn!("Flow '{}' has no steps, skipping", flow.name);
    } else {
        flows.push(flow);
    }
}
