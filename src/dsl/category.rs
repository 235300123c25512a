use serde::{Deserialize, Serialize};

/// Expectation taxonomy the generator must choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    PageLoad,
    ContentPresence,
    Interaction,
    Redirect,
    Visual,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::PageLoad,
        Category::ContentPresence,
        Category::Interaction,
        Category::Redirect,
        Category::Visual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::PageLoad => "PAGE_LOAD",
            Category::ContentPresence => "CONTENT_PRESENCE",
            Category::Interaction => "INTERACTION",
            Category::Redirect => "REDIRECT",
            Category::Visual => "VISUAL",
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Category::PageLoad => &["loads", "load", "renders", "opens", "available", "no error"],
            Category::ContentPresence => &[
                "shows", "displays", "contains", "has", "visible", "heading", "title", "text",
                "lists",
            ],
            Category::Interaction => &[
                "click", "clicks", "press", "submit", "fill", "type", "select", "enter", "toggle",
                "check", "hover", "open the", "log in", "sign in",
            ],
            Category::Redirect => &["redirect", "redirects", "forwarded", "sent to", "ends up"],
            Category::Visual => &["color", "colour", "blue", "red", "bold", "font", "style", "size"],
        }
    }

    /// Minimal instruction template handed to the generator.
    pub fn template(&self) -> &'static str {
        match self {
            Category::PageLoad => r#"[{"action": "expectPageLoaded"}]"#,
            Category::ContentPresence => r#"[{"action": "expectText", "text": "<visible text>"}]"#,
            Category::Interaction => {
                r#"[{"action": "click", "target": {"role": "button", "name": "<label>"}}, {"action": "expectText", "text": "<result>"}]"#
            }
            Category::Redirect => r#"[{"action": "expectRedirect", "from": "<path>", "to": "<path>"}]"#,
            Category::Visual => {
                r#"[{"action": "expectStyle", "target": {"css": "<selector>"}, "property": "color", "value": "rgb(0, 0, 255)"}]"#
            }
        }
    }

    /// Best keyword guess; used for policy checks and logs, never to
    /// override the generator's own choice.
    pub fn guess(text: &str) -> Category {
        let lower = text.to_lowercase();
        let hits = |category: &Category| {
            category
                .keywords()
                .iter()
                .filter(|k| contains_word(&lower, k))
                .count()
        };

        // Redirect and interaction wording is more specific than content wording.
        for category in [Category::Redirect, Category::Interaction, Category::Visual] {
            if hits(&category) > 0 {
                return category;
            }
        }
        if hits(&Category::ContentPresence) > 0 {
            return Category::ContentPresence;
        }
        if hits(&Category::PageLoad) > 0 {
            return Category::PageLoad;
        }
        Category::ContentPresence
    }
}

/// Whether the text reads as describing a user action.
pub fn mentions_interaction(text: &str) -> bool {
    let lower = text.to_lowercase();
    Category::Interaction
        .keywords()
        .iter()
        .any(|k| contains_word(&lower, k))
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + needle.len()..].chars().next();
        !before.map(char::is_alphanumeric).unwrap_or(false)
            && !after.map(char::is_alphanumeric).unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_categories() {
        assert_eq!(Category::guess("the page shows \"About Us\" heading"), Category::ContentPresence);
        assert_eq!(Category::guess("clicking Sign in opens the login modal"), Category::Interaction);
        assert_eq!(Category::guess("visiting /old redirects to /new"), Category::Redirect);
        assert_eq!(Category::guess("the CTA button is blue"), Category::Visual);
        assert_eq!(Category::guess("page loads without errors"), Category::PageLoad);
    }

    #[test]
    fn test_keyword_matching_respects_word_boundaries() {
        assert!(!mentions_interaction("the checkout summary lists items"));
        assert!(mentions_interaction("user can check the terms box"));
        assert!(!mentions_interaction("typeface looks right"));
    }
}
