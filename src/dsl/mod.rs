//! Browser check instruction set
//!
//! The code generator answers with a JSON (or YAML) list of instructions
//! instead of host-language code; the execution engine interprets them
//! against a page. Nothing here can touch the filesystem or the process.

pub mod category;

use crate::error::{EnsureError, EnsureResult};
use serde::{Deserialize, Serialize};

pub use category::Category;

/// Locator for an element. At least one field must be set; when several
/// are, the most specific wins (`css` > `testId` > `role` > `label` >
/// `placeholder` > `text`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Target {
    pub fn css(css: &str) -> Self {
        Self {
            css: Some(css.to_string()),
            ..Default::default()
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn role(role: &str, name: Option<&str>) -> Self {
        Self {
            role: Some(role.to_string()),
            name: name.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.css.is_none()
            && self.test_id.is_none()
            && self.role.is_none()
            && self.label.is_none()
            && self.placeholder.is_none()
            && self.text.is_none()
    }

    /// Short human-readable form used in error messages.
    pub fn describe(&self) -> String {
        if let Some(css) = &self.css {
            return format!("css '{}'", css);
        }
        if let Some(id) = &self.test_id {
            return format!("test id '{}'", id);
        }
        if let Some(role) = &self.role {
            return match &self.name {
                Some(name) => format!("{} '{}'", role, name),
                None => role.clone(),
            };
        }
        if let Some(label) = &self.label {
            return format!("field labelled '{}'", label);
        }
        if let Some(placeholder) = &self.placeholder {
            return format!("field with placeholder '{}'", placeholder);
        }
        match &self.text {
            Some(text) => format!("text '{}'", text),
            None => "<empty target>".to_string(),
        }
    }
}

/// One step of a generated check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Instruction {
    Navigate {
        url: String,
    },
    ExpectPageLoaded,
    ExpectTitle {
        contains: String,
    },
    ExpectText {
        text: String,
    },
    ExpectNoText {
        text: String,
    },
    ExpectVisible {
        target: Target,
    },
    ExpectHidden {
        target: Target,
    },
    ExpectCount {
        target: Target,
        count: usize,
    },
    ExpectUrl {
        contains: String,
    },
    ExpectRedirect {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        status: Option<u16>,
    },
    ExpectStyle {
        target: Target,
        property: String,
        value: String,
    },
    ExpectCookie {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
    ExpectStorage {
        key: String,
        #[serde(default)]
        value: Option<String>,
    },
    Click {
        target: Target,
    },
    Fill {
        target: Target,
        value: String,
    },
    Select {
        target: Target,
        value: String,
    },
    Check {
        target: Target,
    },
    Press {
        key: String,
    },
    WaitFor {
        target: Target,
    },
    Wait {
        ms: u64,
    },
}

impl Instruction {
    /// Instructions that change page state.
    pub fn is_interaction(&self) -> bool {
        matches!(
            self,
            Instruction::Click { .. }
                | Instruction::Fill { .. }
                | Instruction::Select { .. }
                | Instruction::Check { .. }
                | Instruction::Press { .. }
        )
    }

    pub fn target(&self) -> Option<&Target> {
        match self {
            Instruction::ExpectVisible { target }
            | Instruction::ExpectHidden { target }
            | Instruction::ExpectCount { target, .. }
            | Instruction::ExpectStyle { target, .. }
            | Instruction::Click { target }
            | Instruction::Fill { target, .. }
            | Instruction::Select { target, .. }
            | Instruction::Check { target }
            | Instruction::WaitFor { target } => Some(target),
            _ => None,
        }
    }

    /// Short label for logs, e.g. `click(button 'Save')`.
    pub fn label(&self) -> String {
        match self {
            Instruction::Navigate { url } => format!("navigate({})", url),
            Instruction::ExpectPageLoaded => "expectPageLoaded".to_string(),
            Instruction::ExpectTitle { contains } => format!("expectTitle({})", contains),
            Instruction::ExpectText { text } => format!("expectText({})", text),
            Instruction::ExpectNoText { text } => format!("expectNoText({})", text),
            Instruction::ExpectUrl { contains } => format!("expectUrl({})", contains),
            Instruction::ExpectRedirect { from, to, status } => format!(
                "expectRedirect(from={}, to={}, status={})",
                from.as_deref().unwrap_or("*"),
                to.as_deref().unwrap_or("*"),
                status.map(|s| s.to_string()).unwrap_or_else(|| "3xx".into())
            ),
            Instruction::ExpectCookie { name, .. } => format!("expectCookie({})", name),
            Instruction::ExpectStorage { key, .. } => format!("expectStorage({})", key),
            Instruction::Press { key } => format!("press({})", key),
            Instruction::Wait { ms } => format!("wait({}ms)", ms),
            other => {
                let name = match other {
                    Instruction::ExpectVisible { .. } => "expectVisible",
                    Instruction::ExpectHidden { .. } => "expectHidden",
                    Instruction::ExpectCount { .. } => "expectCount",
                    Instruction::ExpectStyle { .. } => "expectStyle",
                    Instruction::Click { .. } => "click",
                    Instruction::Fill { .. } => "fill",
                    Instruction::Select { .. } => "select",
                    Instruction::Check { .. } => "check",
                    _ => "waitFor",
                };
                let target = other.target().map(Target::describe).unwrap_or_default();
                format!("{}({})", name, target)
            }
        }
    }
}

/// A parsed, validated instruction list.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProgramPayload {
    List(Vec<Instruction>),
    Wrapped { instructions: Vec<Instruction> },
}

impl Program {
    /// Parse generator output, tolerating markdown fences around it.
    pub fn parse(code: &str) -> EnsureResult<Self> {
        let body = strip_code_fences(code);
        if body.is_empty() {
            return Err(EnsureError::Generation(
                "generator returned no instructions".to_string(),
            ));
        }

        let payload: ProgramPayload = serde_json::from_str(&body)
            .or_else(|_| serde_yaml::from_str(&body))
            .map_err(|e| {
                EnsureError::Generation(format!("could not parse instructions: {}", e))
            })?;

        let instructions = match payload {
            ProgramPayload::List(list) => list,
            ProgramPayload::Wrapped { instructions } => instructions,
        };

        let program = Self { instructions };
        program.validate()?;
        Ok(program)
    }

    fn validate(&self) -> EnsureResult<()> {
        if self.instructions.is_empty() {
            return Err(EnsureError::Generation(
                "generator returned an empty instruction list".to_string(),
            ));
        }
        for (idx, instruction) in self.instructions.iter().enumerate() {
            if let Some(target) = instruction.target() {
                if target.is_empty() {
                    return Err(EnsureError::Generation(format!(
                        "instruction {} ({}) has a target with no locator",
                        idx + 1,
                        instruction.label()
                    )));
                }
            }
        }
        Ok(())
    }

    /// True when the program opens with its own navigation.
    pub fn starts_with_navigation(&self) -> bool {
        matches!(self.instructions.first(), Some(Instruction::Navigate { .. }))
    }

    pub fn has_interactions(&self) -> bool {
        self.instructions.iter().any(Instruction::is_interaction)
    }

    pub fn references_redirects(&self) -> bool {
        self.instructions
            .iter()
            .any(|i| matches!(i, Instruction::ExpectRedirect { .. }))
    }
}

/// Remove a surrounding ```lang ... ``` wrapper, if any.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines = trimmed.lines();
    lines.next(); // opening fence with optional language tag
    let mut body: Vec<&str> = lines.collect();
    if body.last().map(|l| l.trim() == "```").unwrap_or(false) {
        body.pop();
    }
    body.join("\n").trim().to_string()
}
