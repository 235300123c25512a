//! Turns a page's `ensureUI` comments into expectations
//!
//! Comment blocks are merged locally, then each block is split by the text
//! generator into independently testable expectations. A reply that cannot
//! be used never fails the page: the whole block becomes one expectation.

use crate::dsl::strip_code_fences;
use crate::error::{EnsureError, EnsureResult};
use crate::llm::{GenerationRequest, TextGenerator};
use crate::parser::comments::merge_comment_blocks;
use crate::parser::types::{Expectation, RawComment};
use serde_json::Value;
use std::collections::HashMap;

const SPLIT_SYSTEM_PROMPT: &str = "You split UI test comments into independent, testable \
expectations for an automated browser check. You never invent requirements and you answer \
with JSON only, without commentary.";

/// Shape the generator is asked to answer with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitMode {
    /// A JSON array of expectation strings.
    ExpectationsOnly,
    /// `{"expectations": [...], "urlParams": {...}}` for the named segments.
    WithRouteParams(Vec<String>),
}

impl SplitMode {
    pub fn for_params(dynamic_params: &[String]) -> Self {
        if dynamic_params.is_empty() {
            SplitMode::ExpectationsOnly
        } else {
            SplitMode::WithRouteParams(dynamic_params.to_vec())
        }
    }
}

/// Expectations of one source file plus any route values found in them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub expectations: Vec<Expectation>,
    pub url_params: HashMap<String, String>,
}

pub struct Extractor<'a> {
    generator: &'a dyn TextGenerator,
    max_tokens: u32,
    temperature: f32,
}

impl<'a> Extractor<'a> {
    pub fn new(generator: &'a dyn TextGenerator) -> Self {
        Self {
            generator,
            max_tokens: 1024,
            temperature: 0.0,
        }
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Extract expectations from `source` in comment order.
    pub async fn extract(&self, source: &str, mode: &SplitMode) -> Extraction {
        let mut extraction = Extraction::default();

        for comment in merge_comment_blocks(source) {
            let (texts, params) = match self.split(&comment, mode).await {
                Ok((texts, params)) if !texts.is_empty() => (texts, params),
                Ok(_) => {
                    log::warn!(
                        "Line {}: generator returned no expectations, keeping the comment whole",
                        comment.line_number
                    );
                    (vec![comment.text.clone()], HashMap::new())
                }
                Err(e) => {
                    log::warn!(
                        "Line {}: could not split comment ({}), keeping it whole",
                        comment.line_number,
                        e
                    );
                    (vec![comment.text.clone()], HashMap::new())
                }
            };

            for text in texts {
                extraction.expectations.push(Expectation::new(
                    &text,
                    comment.line_number,
                    &comment.text,
                ));
            }
            extraction.url_params.extend(params);
        }

        extraction
    }

    async fn split(
        &self,
        comment: &RawComment,
        mode: &SplitMode,
    ) -> EnsureResult<(Vec<String>, HashMap<String, String>)> {
        let request = GenerationRequest::new(split_prompt(&comment.text, mode), SPLIT_SYSTEM_PROMPT)
            .with_limits(self.max_tokens, self.temperature);
        let reply = self.generator.generate_text(&request).await?;
        parse_split_response(&reply)
    }
}

fn split_prompt(comment: &str, mode: &SplitMode) -> String {
    let mut prompt = String::new();
    prompt.push_str("Split this UI expectation comment into independent, testable expectations.\n\n");
    prompt.push_str("Rules:\n");
    prompt.push_str("- Each expectation must be checkable on its own against the page.\n");
    prompt.push_str(
        "- Steps that describe one continuous interaction stay together in a single \
         expectation, joined with \"then\" in their original order.\n",
    );
    prompt.push_str("- Keep the author's wording and quoted strings exactly.\n");
    prompt.push_str("- Do not add expectations that are not in the comment.\n\n");

    match mode {
        SplitMode::ExpectationsOnly => {
            prompt.push_str("Answer with a JSON array of strings, e.g. [\"the page shows a heading\"].\n");
        }
        SplitMode::WithRouteParams(params) => {
            prompt.push_str(&format!(
                "The page route has dynamic segments: {}. If the comment names a literal value \
                 for a segment (e.g. \"with id 123\"), extract it.\n",
                params.join(", ")
            ));
            prompt.push_str(
                "Answer with a JSON object: {\"expectations\": [\"...\"], \"urlParams\": {\"<segment>\": \"<value>\"}}. \
                 Omit segments that have no value in the comment.\n",
            );
        }
    }

    prompt.push_str("\nComment:\n");
    prompt.push_str(comment);
    prompt
}

/// Accept a JSON array of strings or `{expectations, urlParams}`.
pub fn parse_split_response(reply: &str) -> EnsureResult<(Vec<String>, HashMap<String, String>)> {
    let body = strip_code_fences(reply);
    let value: Value = serde_json::from_str(&body)
        .or_else(|_| serde_json::from_str(embedded_json(&body)))
        .map_err(|e| EnsureError::Generation(format!("split reply is not JSON: {}", e)))?;

    match value {
        Value::Array(items) => Ok((string_list(&items)?, HashMap::new())),
        Value::Object(map) => {
            let items = map
                .get("expectations")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    EnsureError::Generation("split reply has no expectations array".into())
                })?;
            let expectations = string_list(items)?;

            let mut params = HashMap::new();
            if let Some(Value::Object(raw)) = map.get("urlParams") {
                for (key, value) in raw {
                    let value = match value {
                        Value::String(s) => s.trim().to_string(),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        _ => continue,
                    };
                    if !value.is_empty() {
                        params.insert(key.clone(), value);
                    }
                }
            }
            Ok((expectations, params))
        }
        other => Err(EnsureError::Generation(format!(
            "split reply has unexpected shape: {}",
            other
        ))),
    }
}

fn string_list(items: &[Value]) -> EnsureResult<Vec<String>> {
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| EnsureError::Generation(format!("expectation is not a string: {}", item)))
        })
        .filter(|r| r.as_ref().map(|s| !s.is_empty()).unwrap_or(true))
        .collect()
}

/// Outermost `[...]` or `{...}` span, for replies wrapped in prose.
fn embedded_json(text: &str) -> &str {
    let start = text.find(|c| c == '[' || c == '{');
    let end = text.rfind(|c| c == ']' || c == '}');
    match (start, end) {
        (Some(s), Some(e)) if e > s => &text[s..=e],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[test]
    fn test_parse_array_reply() {
        let (texts, params) =
            parse_split_response(r#"["shows a heading", " lists 3 posts "]"#).unwrap();
        assert_eq!(texts, vec!["shows a heading", "lists 3 posts"]);
        assert!(params.is_empty());
    }

    #[test]
    fn test_parse_object_reply_coerces_params() {
        let reply = "```json\n{\"expectations\": [\"shows order 42\"], \"urlParams\": {\"id\": 42, \"slug\": \" intro \", \"x\": null}}\n```";
        let (texts, params) = parse_split_response(reply).unwrap();
        assert_eq!(texts, vec!["shows order 42"]);
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert_eq!(params.get("slug").map(String::as_str), Some("intro"));
        assert!(!params.contains_key("x"));
    }

    #[test]
    fn test_parse_reply_wrapped_in_prose() {
        let (texts, _) = parse_split_response("Here you go:\n[\"a\", \"b\"]\nThanks").unwrap();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(parse_split_response("not json").is_err());
        assert!(parse_split_response("[1, 2]").is_err());
        assert!(parse_split_response(r#"{"items": []}"#).is_err());
        assert!(parse_split_response("\"just a string\"").is_err());
    }

    #[tokio::test]
    async fn test_extract_splits_in_order() {
        let source = "\
// ensureUI: the page shows \"About Us\" heading
// and the team section lists members
export default function About() {}
// ensureUI: footer has a contact link
";
        let generator = ScriptedGenerator::new(vec![
            Ok(r#"["the page shows \"About Us\" heading", "the team section lists members"]"#.into()),
            Ok(r#"["footer has a contact link"]"#.into()),
        ]);

        let extraction = Extractor::new(&generator)
            .extract(source, &SplitMode::ExpectationsOnly)
            .await;

        let texts: Vec<&str> = extraction.expectations.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "the page shows \"About Us\" heading",
                "the team section lists members",
                "footer has a contact link"
            ]
        );
        assert_eq!(extraction.expectations[1].line_number, 1);
        assert_eq!(extraction.expectations[2].line_number, 4);
        assert_eq!(
            extraction.expectations[0].original_comment,
            "the page shows \"About Us\" heading and the team section lists members"
        );

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("JSON array of strings"));
    }

    #[tokio::test]
    async fn test_extract_falls_back_on_bad_reply() {
        let source = "// ensureUI: with id 7 the order page shows order #7\n";
        let generator = ScriptedGenerator::new(vec![Ok("I cannot help with that".into())]);

        let extraction = Extractor::new(&generator)
            .extract(source, &SplitMode::for_params(&["id".to_string()]))
            .await;

        assert_eq!(extraction.expectations.len(), 1);
        assert_eq!(
            extraction.expectations[0].text,
            "with id 7 the order page shows order #7"
        );
        assert!(extraction.url_params.is_empty());
        assert!(generator.prompts()[0].contains("dynamic segments: id"));
    }

    #[tokio::test]
    async fn test_extract_falls_back_on_generator_error() {
        let source = "// ensureUI: page loads\n";
        let generator = ScriptedGenerator::new(vec![Err(EnsureError::Generation(
            "connection refused".into(),
        ))]);

        let extraction = Extractor::new(&generator)
            .extract(source, &SplitMode::ExpectationsOnly)
            .await;
        assert_eq!(extraction.expectations.len(), 1);
        assert_eq!(extraction.expectations[0].text, "page loads");
    }

    #[tokio::test]
    async fn test_extract_collects_route_params() {
        let source = "// ensureUI: with slug hello-world the post title is shown\n";
        let generator = ScriptedGenerator::new(vec![Ok(
            r#"{"expectations": ["the post title is shown"], "urlParams": {"slug": "hello-world"}}"#
                .into(),
        )]);

        let extraction = Extractor::new(&generator)
            .extract(source, &SplitMode::for_params(&["slug".to_string()]))
            .await;
        assert_eq!(
            extraction.url_params.get("slug").map(String::as_str),
            Some("hello-world")
        );
    }
}
