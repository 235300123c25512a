//! Compiles one natural-language expectation into an instruction program
//!
//! The prompt lays out the category taxonomy and the instruction reference;
//! the generator must pick exactly one category and answer with only the
//! instructions for it. Generator failures are returned to the caller since
//! there is no safe default program.

use crate::driver::RedirectRecord;
use crate::dsl::category::mentions_interaction;
use crate::dsl::{strip_code_fences, Category, Program};
use crate::error::{EnsureError, EnsureResult};
use crate::llm::{GenerationRequest, TextGenerator};
use crate::utils::config::InteractionPolicy;

const SYNTH_SYSTEM_PROMPT: &str = "You write browser checks as JSON instruction lists for an \
automated test runner. Output only the JSON array, no prose and no explanations.";

const INSTRUCTION_REFERENCE: &str = r#"Instructions (objects tagged by "action"):
- {"action": "navigate", "url": "/path"}
- {"action": "expectPageLoaded"}
- {"action": "expectTitle", "contains": "..."}
- {"action": "expectText", "text": "..."} / {"action": "expectNoText", "text": "..."}
- {"action": "expectVisible", "target": T} / {"action": "expectHidden", "target": T}
- {"action": "expectCount", "target": T, "count": 3}
- {"action": "expectUrl", "contains": "/dashboard"}
- {"action": "expectRedirect", "from": "/old", "to": "/new", "status": 301}  (every field optional)
- {"action": "expectStyle", "target": T, "property": "color", "value": "rgb(0, 0, 255)"}
- {"action": "expectCookie", "name": "...", "value": "..."} / {"action": "expectStorage", "key": "...", "value": "..."}
- {"action": "click", "target": T} / {"action": "check", "target": T} / {"action": "waitFor", "target": T}
- {"action": "fill", "target": T, "value": "..."} / {"action": "select", "target": T, "value": "..."}
- {"action": "press", "key": "Enter"} / {"action": "wait", "ms": 500}
A target T is an object with one of: "css", "text", "role" (+ optional "name"), "label", "placeholder", "testId".
Prefer role+name or label over css. Use selectors that exist in the HTML below."#;

/// Whether the expectation belongs to a page test or a flow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisMode {
    /// Runs on a freshly navigated isolated page.
    Page,
    /// Continues on the flow's current page; state carries over.
    Flow,
}

/// Generator output before and after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    /// Fence-stripped generator text, as stored in reports
    pub code: String,
    pub program: Program,
}

/// Inputs of one synthesis call.
pub struct SynthesisInput<'a> {
    pub html: &'a str,
    pub expectation: &'a str,
    pub current_url: &'a str,
    pub redirect_chain: &'a [RedirectRecord],
    pub mode: SynthesisMode,
}

pub struct Synthesizer<'a> {
    generator: &'a dyn TextGenerator,
    max_tokens: u32,
    temperature: f32,
    policy: InteractionPolicy,
}

impl<'a> Synthesizer<'a> {
    pub fn new(generator: &'a dyn TextGenerator) -> Self {
        Self {
            generator,
            max_tokens: 1024,
            temperature: 0.0,
            policy: InteractionPolicy::Allow,
        }
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_policy(mut self, policy: InteractionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ask the generator for a program and validate it.
    ///
    /// On a parse failure the raw text is still returned inside the error
    /// message so the report shows what the generator said.
    pub async fn synthesize(&self, input: &SynthesisInput<'_>) -> EnsureResult<Synthesis> {
        let request = GenerationRequest::new(build_prompt(input), SYNTH_SYSTEM_PROMPT)
            .with_limits(self.max_tokens, self.temperature);
        let reply = self.generator.generate_text(&request).await?;
        let code = strip_code_fences(&reply);

        log::debug!(
            "Synthesized for '{}' (guessed {}): {}",
            input.expectation,
            Category::guess(input.expectation).as_str(),
            code
        );

        let program = Program::parse(&code)?;
        self.check_policy(input, &program)?;
        Ok(Synthesis { code, program })
    }

    fn check_policy(&self, input: &SynthesisInput<'_>, program: &Program) -> EnsureResult<()> {
        if self.policy == InteractionPolicy::DenyForStatic
            && input.mode == SynthesisMode::Page
            && program.has_interactions()
            && !mentions_interaction(input.expectation)
        {
            return Err(EnsureError::Generation(format!(
                "static expectation compiled to interactions ({}); interactions are not allowed here",
                program
                    .instructions
                    .iter()
                    .filter(|i| i.is_interaction())
                    .map(|i| i.label())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        Ok(())
    }
}

fn build_prompt(input: &SynthesisInput<'_>) -> String {
    let mut prompt = String::new();

    prompt.push_str("Classify the expectation into exactly ONE category, then output only the instructions for that category. ");
    prompt.push_str("Do not add assertions the expectation does not ask for.\n\nCategories:\n");
    for category in Category::ALL {
        prompt.push_str(&format!(
            "- {} (keywords: {})\n  template: {}\n",
            category.as_str(),
            category.keywords().join(", "),
            category.template()
        ));
    }

    prompt.push('\n');
    prompt.push_str(INSTRUCTION_REFERENCE);
    prompt.push_str("\n\n");

    match input.mode {
        SynthesisMode::Page => prompt.push_str(
            "Context: the page below has just been loaded fresh with empty cookies. \
             Do not navigate away unless the expectation requires it.\n",
        ),
        SynthesisMode::Flow => prompt.push_str(
            "Context: this is one step of a multi-step user journey. The browser is already \
             on the page below with the session from earlier steps. Perform the step and \
             verify its outcome; do not repeat earlier steps.\n",
        ),
    }

    prompt.push_str(&format!("Current URL: {}\n", input.current_url));

    if !input.redirect_chain.is_empty() {
        let chain = serde_json::to_string(input.redirect_chain).unwrap_or_else(|_| "[]".into());
        prompt.push_str(&format!(
            "redirectChain (responses observed so far, [{{url,status,location}}]): {}\n\
             Use expectRedirect for redirect expectations; it is checked against this chain.\n",
            chain
        ));
    }

    prompt.push_str(&format!("\nExpectation: {}\n", input.expectation));
    prompt.push_str("\nPage HTML:\n");
    prompt.push_str(input.html);
    prompt
}
