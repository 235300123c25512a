//! Browser driver implementation using Playwright
//!
//! One `PlaywrightLauncher::launch` call yields one browser with one fresh
//! context. Every page opened in that context reports its responses to the
//! session's redirect tracker.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use playwright::api::page::Event as PageEvent;
use playwright::api::{Browser, BrowserContext, DocumentLoadState, Header, Page, Viewport};
use playwright::Playwright;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::driver::common::escape_css_string;
use crate::driver::redirect::RedirectTracker;
use crate::driver::traits::{
    BrowserLauncher, BrowserSession, NavigationOutcome, PageHandle, StoredCookie,
};
use crate::dsl::Target;

/// Web browser type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

/// Browser launch configuration
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    pub browser_type: BrowserType,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Explicit browser binary; discovered when unset.
    pub executable: Option<PathBuf>,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            browser_type: BrowserType::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            executable: std::env::var("PLAYWRIGHT_CHROMIUM_EXECUTABLE_PATH")
                .ok()
                .map(PathBuf::from),
        }
    }
}

/// Starts a fresh browser for every session.
pub struct PlaywrightLauncher {
    config: WebDriverConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let playwright = Playwright::initialize()
            .await
            .context("Failed to initialize Playwright")?;

        let browser = match self.config.browser_type {
            BrowserType::Chromium => {
                launch_chromium_browser(&playwright.chromium(), &self.config).await?
            }
            BrowserType::Firefox => {
                playwright
                    .firefox()
                    .launcher()
                    .headless(self.config.headless)
                    .launch()
                    .await?
            }
            BrowserType::Webkit => {
                playwright
                    .webkit()
                    .launcher()
                    .headless(self.config.headless)
                    .launch()
                    .await?
            }
        };

        let context = browser
            .context_builder()
            .build()
            .await
            .context("Failed to create browser context")?;

        log::debug!("Launched {:?} (headless: {})", self.config.browser_type, self.config.headless);

        Ok(Box::new(WebSession {
            _playwright: Arc::new(playwright),
            browser: Arc::new(browser),
            context: Arc::new(context),
            viewport: Viewport {
                width: self.config.viewport_width as i32,
                height: self.config.viewport_height as i32,
            },
            redirects: RedirectTracker::new(),
        }))
    }
}

/// One browser plus its single context.
pub struct WebSession {
    _playwright: Arc<Playwright>,
    browser: Arc<Browser>,
    context: Arc<BrowserContext>,
    viewport: Viewport,
    redirects: RedirectTracker,
}

#[async_trait]
impl BrowserSession for WebSession {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        let page = self.context.new_page().await?;
        page.set_viewport_size(self.viewport.clone()).await?;
        observe_responses(&page, self.redirects.clone())?;
        Ok(Box::new(WebPage {
            page: Arc::new(Mutex::new(page)),
        }))
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        let cookies = self.context.cookies(&[]).await?;
        Ok(cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect())
    }

    async fn clear_cookies(&self) -> Result<()> {
        self.context.clear_cookies().await?;
        Ok(())
    }

    fn redirects(&self) -> RedirectTracker {
        self.redirects.clone()
    }

    async fn close(&self) -> Result<()> {
        self.context.close().await?;
        self.browser.close().await?;
        Ok(())
    }
}

/// Feed every response of `page` into the tracker until the page goes away.
fn observe_responses(page: &Page, tracker: RedirectTracker) -> Result<()> {
    let mut events = Box::pin(page.subscribe_event()?);
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Ok(PageEvent::Response(response)) = event {
                let status = response.status().unwrap_or(0);
                let url = response.url().unwrap_or_default();
                let location = match response.headers().await {
                    Ok(headers) => header_value(&headers, "location"),
                    Err(e) => {
                        log::debug!("No headers for {}: {}", url, e);
                        None
                    }
                };
                tracker.record(&url, status.clamp(0, u16::MAX as i32) as u16, location);
            }
        }
    });
    Ok(())
}

fn header_value(headers: &[Header], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// A single Playwright page.
pub struct WebPage {
    page: Arc<Mutex<Page>>,
}

impl WebPage {
    async fn wait_attached(&self, page: &Page, selector: &str, timeout_ms: u64) -> Result<()> {
        page.wait_for_selector_builder(selector)
            .timeout(playwright_timeout(timeout_ms))
            .wait_for_selector()
            .await
            .with_context(|| format!("Element not found within {}ms: {}", timeout_ms, selector))?;
        Ok(())
    }
}

#[async_trait]
impl PageHandle for WebPage {
    async fn goto(&self, url: &str, timeout_ms: u64) -> Result<NavigationOutcome> {
        let page = self.page.lock().await;
        let response = page
            .goto_builder(url)
            .timeout(playwright_timeout(timeout_ms))
            .wait_until(DocumentLoadState::Load)
            .goto()
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;

        let status = match response {
            Some(r) => Some(r.status()?.clamp(0, u16::MAX as i32) as u16),
            None => None,
        };
        let final_url: String = page
            .evaluate::<(), String>("() => window.location.href", ())
            .await?;
        Ok(NavigationOutcome { status, final_url })
    }

    async fn content(&self) -> Result<String> {
        let page = self.page.lock().await;
        Ok(page.content().await?)
    }

    async fn url(&self) -> Result<String> {
        let page = self.page.lock().await;
        Ok(page
            .evaluate::<(), String>("() => window.location.href", ())
            .await?)
    }

    async fn title(&self) -> Result<String> {
        let page = self.page.lock().await;
        Ok(page
            .evaluate::<(), String>("() => document.title", ())
            .await?)
    }

    async fn is_visible(&self, target: &Target) -> Result<bool> {
        let page = self.page.lock().await;
        let sel = target_to_selector(target);
        match page.query_selector(&sel).await? {
            Some(el) => Ok(el.is_visible().await?),
            None => Ok(false),
        }
    }

    async fn count(&self, target: &Target) -> Result<usize> {
        let page = self.page.lock().await;
        let sel = target_to_selector(target);
        Ok(page.query_selector_all(&sel).await?.len())
    }

    async fn click(&self, target: &Target, timeout_ms: u64) -> Result<()> {
        let page = self.page.lock().await;
        let sel = target_to_selector(target);
        self.wait_attached(&page, &sel, timeout_ms).await?;
        page.click_builder(&sel)
            .timeout(playwright_timeout(timeout_ms))
            .click()
            .await
            .with_context(|| format!("Could not click {}", target.describe()))?;
        Ok(())
    }

    async fn fill(&self, target: &Target, value: &str, timeout_ms: u64) -> Result<()> {
        let page = self.page.lock().await;
        let sel = target_to_selector(target);
        self.wait_attached(&page, &sel, timeout_ms).await?;
        match page.query_selector(&sel).await? {
            Some(el) => {
                el.fill_builder(value).fill().await?;
                Ok(())
            }
            None => anyhow::bail!("Element not found: {}", target.describe()),
        }
    }

    async fn select_option(&self, target: &Target, value: &str, timeout_ms: u64) -> Result<()> {
        let page = self.page.lock().await;
        let sel = target_to_selector(target);
        self.wait_attached(&page, &sel, timeout_ms).await?;
        let js = "(el, wanted) => {
            const option = Array.from(el.options || []).find(
                o => o.value === wanted || o.label === wanted || o.text.trim() === wanted
            );
            if (!option) return false;
            el.value = option.value;
            el.dispatchEvent(new Event('input', { bubbles: true }));
            el.dispatchEvent(new Event('change', { bubbles: true }));
            return true;
        }";
        let selected: bool = page
            .evaluate_on_selector::<String, bool>(&sel, js, Some(value.to_string()))
            .await?;
        if !selected {
            anyhow::bail!("Option '{}' not found in {}", value, target.describe());
        }
        Ok(())
    }

    async fn check(&self, target: &Target, timeout_ms: u64) -> Result<()> {
        let page = self.page.lock().await;
        let sel = target_to_selector(target);
        self.wait_attached(&page, &sel, timeout_ms).await?;
        let js = "el => { if (!el.checked) el.click(); return !!el.checked; }";
        let checked: bool = page
            .evaluate_on_selector::<String, bool>(&sel, js, None::<String>)
            .await?;
        if !checked {
            anyhow::bail!("{} did not become checked", target.describe());
        }
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<()> {
        let page = self.page.lock().await;
        page.keyboard.down(key).await?;
        page.keyboard.up(key).await?;
        Ok(())
    }

    async fn computed_style(&self, target: &Target, property: &str) -> Result<String> {
        let page = self.page.lock().await;
        let sel = target_to_selector(target);
        let js = "(el, prop) => window.getComputedStyle(el).getPropertyValue(prop).trim()";
        let value: String = page
            .evaluate_on_selector::<String, String>(&sel, js, Some(property.to_string()))
            .await
            .with_context(|| format!("Could not read '{}' of {}", property, target.describe()))?;
        Ok(value)
    }

    async fn local_storage(&self) -> Result<HashMap<String, String>> {
        let page = self.page.lock().await;
        let items: HashMap<String, String> = page
            .evaluate::<(), HashMap<String, String>>(
                "() => Object.fromEntries(Object.entries(window.localStorage))",
                (),
            )
            .await?;
        Ok(items)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let page = self.page.lock().await;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        page.screenshot_builder()
            .full_page(true)
            .path(path.to_path_buf())
            .screenshot()
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let page = self.page.lock().await;
        page.close(None).await?;
        Ok(())
    }
}

/// Playwright reads a timeout of 0 as "wait forever"; the shared timeout
/// must always bound an action.
fn playwright_timeout(timeout_ms: u64) -> f64 {
    timeout_ms.max(1) as f64
}

/// Map an instruction target to a Playwright selector string.
///
/// Precedence matches `Target`: css, testId, role, label, placeholder, text.
pub fn target_to_selector(target: &Target) -> String {
    if let Some(css) = &target.css {
        return css.clone();
    }
    if let Some(id) = &target.test_id {
        return format!("[data-testid=\"{}\"]", escape_css_string(id));
    }
    if let Some(role) = &target.role {
        let base = role_to_css(role);
        return match &target.name {
            Some(name) => format!("{}:has-text(\"{}\")", base, escape_css_string(name)),
            None => base,
        };
    }
    if let Some(label) = &target.label {
        let label = escape_css_string(label);
        // one css selector list; `>>` would chain across the commas
        return format!(
            "[aria-label=\"{0}\"], [name=\"{0}\"], input[id=\"{0}\"], label:has-text(\"{0}\") input, label:has-text(\"{0}\") textarea, label:has-text(\"{0}\") select",
            label
        );
    }
    if let Some(placeholder) = &target.placeholder {
        return format!("[placeholder=\"{}\"]", escape_css_string(placeholder));
    }
    match &target.text {
        Some(text) => format!("text=\"{}\"", escape_css_string(text)),
        None => "*".to_string(),
    }
}

/// ARIA role to the elements that carry it implicitly or explicitly.
fn role_to_css(role: &str) -> String {
    let implicit = match role.to_lowercase().as_str() {
        "button" => "button, input[type=\"button\"], input[type=\"submit\"]",
        "link" => "a[href]",
        "heading" => "h1, h2, h3, h4, h5, h6",
        "textbox" => "input:not([type]), input[type=\"text\"], input[type=\"email\"], input[type=\"password\"], textarea",
        "checkbox" => "input[type=\"checkbox\"]",
        "radio" => "input[type=\"radio\"]",
        "combobox" => "select",
        "img" | "image" => "img",
        "list" => "ul, ol",
        "listitem" => "li",
        "navigation" => "nav",
        "dialog" => "dialog",
        "form" => "form",
        _ => "",
    };
    let explicit = format!("[role=\"{}\"]", escape_css_string(role));
    if implicit.is_empty() {
        explicit
    } else {
        format!(":is({}, {})", implicit, explicit)
    }
}

/// Launch a new Chromium browser, preferring an explicit or system binary
async fn launch_chromium_browser(
    chromium: &playwright::api::BrowserType,
    config: &WebDriverConfig,
) -> Result<Browser> {
    let mut launcher = chromium.launcher();
    launcher = launcher.headless(config.headless);

    let system_path = find_system_browser();

    if let Some(ref path) = config.executable {
        log::info!("Using browser from config: {}", path.display());
        launcher = launcher.executable(path);
    } else if let Some(ref path) = system_path {
        log::info!("Using discovered browser: {}", path.display());
        launcher = launcher.executable(path);
    } else {
        log::info!("No browser executable found, relying on Playwright's bundled browser");
    }

    let args: Vec<String> = [
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
        "--disable-gpu",
        "--ignore-certificate-errors",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    launcher = launcher.args(&args);

    launcher
        .launch()
        .await
        .context("Failed to launch Chromium")
}

fn find_system_browser() -> Option<PathBuf> {
    let common_paths = [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
    ];

    common_paths
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_wins_over_other_fields() {
        let target = Target {
            css: Some("#cta".into()),
            text: Some("Buy".into()),
            ..Default::default()
        };
        assert_eq!(target_to_selector(&target), "#cta");
    }

    #[test]
    fn test_role_with_name() {
        let sel = target_to_selector(&Target::role("button", Some("Sign in")));
        assert_eq!(
            sel,
            ":is(button, input[type=\"button\"], input[type=\"submit\"], [role=\"button\"]):has-text(\"Sign in\")"
        );
        assert_eq!(
            target_to_selector(&Target::role("tab", None)),
            "[role=\"tab\"]"
        );
    }

    #[test]
    fn test_text_and_test_id_are_escaped() {
        assert_eq!(
            target_to_selector(&Target::text(r#"Say "hi""#)),
            r#"text="Say \"hi\"""#
        );
        let target = Target {
            test_id: Some("login-form".into()),
            ..Default::default()
        };
        assert_eq!(target_to_selector(&target), "[data-testid=\"login-form\"]");
    }

    #[test]
    fn test_placeholder_selector() {
        let target = Target {
            placeholder: Some("Email".into()),
            ..Default::default()
        };
        assert_eq!(target_to_selector(&target), "[placeholder=\"Email\"]");
    }

    #[test]
    fn test_label_selector_is_a_single_css_list() {
        let target = Target {
            label: Some("Email".into()),
            ..Default::default()
        };
        let sel = target_to_selector(&target);

        assert!(!sel.contains(">>"), "{}", sel);
        let alternatives: Vec<&str> = sel.split(", ").collect();
        assert_eq!(
            alternatives,
            vec![
                "[aria-label=\"Email\"]",
                "[name=\"Email\"]",
                "input[id=\"Email\"]",
                "label:has-text(\"Email\") input",
                "label:has-text(\"Email\") textarea",
                "label:has-text(\"Email\") select",
            ]
        );
    }

    #[test]
    fn test_role_and_label_selectors_never_chain() {
        let quoted = Target {
            label: Some(r#"Your "work" email"#.into()),
            ..Default::default()
        };
        let sel = target_to_selector(&quoted);
        assert!(sel.contains(r#"label:has-text("Your \"work\" email") input"#), "{}", sel);

        for role in ["button", "link", "heading", "textbox", "combobox", "tab"] {
            let sel = target_to_selector(&Target::role(role, Some("Go")));
            assert!(!sel.contains(">>"), "{}", sel);
            assert!(sel.ends_with(":has-text(\"Go\")"), "{}", sel);
        }
    }

    #[test]
    fn test_action_timeout_is_always_bounded() {
        assert_eq!(playwright_timeout(15_000), 15_000.0);
        assert_eq!(playwright_timeout(0), 1.0);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let headers = vec![
            Header {
                name: "content-type".to_string(),
                value: "text/html".to_string(),
            },
            Header {
                name: "Location".to_string(),
                value: "/new".to_string(),
            },
        ];
        assert_eq!(header_value(&headers, "location").as_deref(), Some("/new"));
        assert_eq!(header_value(&headers, "set-cookie"), None);
    }
}
