use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One merged `ensureUI` comment block, before it is split into expectations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawComment {
    pub text: String,
    /// 1-based line of the block's opening marker
    pub line_number: usize,
}

/// A single natural-language assertion and the outcome of running it.
///
/// After a run exactly one of `passed == true` / `error.is_some()` holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    pub text: String,
    pub line_number: usize,
    pub original_comment: String,
    pub generated_code: Option<String>,
    pub passed: bool,
    pub error: Option<String>,
}

impl Expectation {
    pub fn new(text: &str, line_number: usize, original_comment: &str) -> Self {
        Self {
            text: text.trim().to_string(),
            line_number,
            original_comment: original_comment.to_string(),
            generated_code: None,
            passed: false,
            error: None,
        }
    }

    pub fn pass(&mut self) {
        self.passed = true;
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.passed = false;
        let error = error.into();
        self.error = Some(if error.is_empty() {
            "unknown error".to_string()
        } else {
            error
        });
    }
}

/// A page file together with its resolved URL and extracted expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTarget {
    pub file_path: String,
    pub route: String,
    pub url: String,
    pub raw_expectations: Vec<String>,
    pub expectations: Vec<Expectation>,
    pub url_params: HashMap<String, String>,
}

impl PageTarget {
    /// `route` must already start with `/`.
    pub fn new(file_path: &str, route: &str, deployment_base: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            route: route.to_string(),
            url: join_url(deployment_base, route),
            raw_expectations: Vec::new(),
            expectations: Vec::new(),
            url_params: HashMap::new(),
        }
    }
}

/// Join a deployment base URL and an absolute route without doubling slashes.
pub fn join_url(base: &str, route: &str) -> String {
    if route.starts_with("http://") || route.starts_with("https://") {
        return route.to_string();
    }
    let base = base.trim_end_matches('/');
    if route.starts_with('/') {
        format!("{}{}", base, route)
    } else {
        format!("{}/{}", base, route)
    }
}

/// A named multi-step journey parsed from a flow document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    pub name: String,
    pub description: String,
    pub variables: HashMap<String, String>,
    pub steps: Vec<FlowStep>,
    #[serde(default)]
    pub source_path: Option<String>,
}

impl FlowDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            description: String::new(),
            variables: HashMap::new(),
            steps: Vec::new(),
            source_path: None,
        }
    }

    /// Replace every `@name` with its declared value.
    pub fn substitute(&self, text: &str) -> String {
        substitute_variables(text, &self.variables)
    }
}

/// Replace every `@name` with its value from `variables` in a single pass.
///
/// A reference is an `@` not glued to a preceding name character, followed
/// by a declared name that is not itself followed by one. At each `@` the
/// longest declared name wins, so `@user_id` is not clobbered by `@user`,
/// and substituted values are never rescanned.
pub fn substitute_variables(text: &str, variables: &HashMap<String, String>) -> String {
    let mut names: Vec<&String> = variables.keys().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut search = 0;
    while let Some(offset) = text[search..].find('@') {
        let at = search + offset;
        let after = &text[at + 1..];
        let glued = text[..at].chars().next_back().map_or(false, is_name_char);
        let name = names.iter().find(|name| {
            after.starts_with(name.as_str())
                && !after[name.len()..].chars().next().map_or(false, is_name_char)
        });
        match name {
            Some(name) if !glued => {
                out.push_str(&text[copied..at]);
                out.push_str(&variables[name.as_str()]);
                copied = at + 1 + name.len();
                search = copied;
            }
            _ => search = at + 1,
        }
    }
    out.push_str(&text[copied..]);
    out
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// One numbered step of a flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowStep {
    pub index: usize,
    pub description: String,
    pub url: Option<String>,
    pub passed: bool,
    pub error: Option<String>,
    pub generated_code: Option<String>,
    #[serde(default)]
    pub attempted: bool,
    #[serde(default)]
    pub screenshot_path: Option<String>,
}

impl FlowStep {
    pub fn new(index: usize, description: &str, url: Option<String>) -> Self {
        Self {
            index,
            description: description.trim().to_string(),
            url,
            passed: false,
            error: None,
            generated_code: None,
            attempted: false,
            screenshot_path: None,
        }
    }

    pub fn pass(&mut self) {
        self.attempted = true;
        self.passed = true;
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.attempted = true;
        self.passed = false;
        let error = error.into();
        self.error = Some(if error.is_empty() {
            "unknown error".to_string()
        } else {
            error
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://app.dev/", "/about"), "https://app.dev/about");
        assert_eq!(join_url("https://app.dev", "/"), "https://app.dev/");
        assert_eq!(join_url("https://app.dev", "login"), "https://app.dev/login");
        assert_eq!(
            join_url("https://app.dev", "https://other.dev/x"),
            "https://other.dev/x"
        );
    }

    #[test]
    fn test_expectation_outcome_is_exclusive() {
        let mut exp = Expectation::new(" shows a heading ", 3, "shows a heading");
        assert_eq!(exp.text, "shows a heading");

        exp.fail("boom");
        assert!(!exp.passed);
        assert_eq!(exp.error.as_deref(), Some("boom"));

        exp.pass();
        assert!(exp.passed);
        assert!(exp.error.is_none());

        exp.fail("");
        assert_eq!(exp.error.as_deref(), Some("unknown error"));
    }

    #[test]
    fn test_substitute_prefers_longest_name() {
        let mut flow = FlowDefinition::new("Login");
        flow.variables.insert("user".into(), "alice".into());
        flow.variables.insert("user_id".into(), "42".into());

        assert_eq!(
            flow.substitute("open profile @user_id for @user"),
            "open profile 42 for alice"
        );
    }

    #[test]
    fn test_substitute_does_not_rescan_values() {
        let mut flow = FlowDefinition::new("Signup");
        flow.variables.insert("username".into(), "a@b.com".into());
        flow.variables.insert("b".into(), "SHOULD-NOT-APPEAR".into());

        assert_eq!(
            flow.substitute("Fill in email field with @username"),
            "Fill in email field with a@b.com"
        );
        assert_eq!(flow.substitute("mail me at x@y.org"), "mail me at x@y.org");
    }

    #[test]
    fn test_substitute_requires_name_boundaries() {
        let mut flow = FlowDefinition::new("Signup");
        flow.variables.insert("username".into(), "a@b.com".into());
        flow.variables.insert("b".into(), "SHOULD-NOT-APPEAR".into());

        assert_eq!(flow.substitute("type @usernameX"), "type @usernameX");
        assert_eq!(flow.substitute("write to x@b.com"), "write to x@b.com");
        assert_eq!(flow.substitute("sign in as @username."), "sign in as a@b.com.");
        assert_eq!(flow.substitute("(@username)"), "(a@b.com)");
        assert_eq!(flow.substitute("@b"), "SHOULD-NOT-APPEAR");
    }
}
