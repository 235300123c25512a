//! In-memory collaborators for tests
//!
//! `ScriptedGenerator` replays canned generator replies in order and records
//! every request. `FakeBrowser` serves a `FakeSite` (static pages, redirects,
//! click targets, cookies) and records what each session did.

use crate::driver::{
    BrowserLauncher, BrowserSession, NavigationOutcome, PageHandle, RedirectTracker, StoredCookie,
};
use crate::dsl::Target;
use crate::error::{EnsureError, EnsureResult};
use crate::llm::{GenerationRequest, TextGenerator};
use crate::utils::html::visible_text;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ============================================================================
// Text generator
// ============================================================================

pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<EnsureResult<String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<EnsureResult<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_text(&self, request: &GenerationRequest) -> EnsureResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EnsureError::Generation("no scripted reply left".into())))
    }
}

// ============================================================================
// Site model
// ============================================================================

#[derive(Debug, Clone)]
struct SitePage {
    status: u16,
    title: String,
    html: String,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pages: HashMap<String, SitePage>,
    redirects: HashMap<String, (u16, String)>,
    clicks: Vec<(String, String)>,
    cookies_on_visit: HashMap<String, (String, String)>,
    storage_on_visit: HashMap<String, (String, String)>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, path: &str, status: u16, title: &str, html: &str) -> Self {
        self.pages.insert(
            path.to_string(),
            SitePage {
                status,
                title: title.to_string(),
                html: html.to_string(),
            },
        );
        self
    }

    pub fn redirect(mut self, from: &str, status: u16, to: &str) -> Self {
        self.redirects
            .insert(from.to_string(), (status, to.to_string()));
        self
    }

    /// Clicking a target whose name or text contains `needle` opens `path`.
    pub fn on_click(mut self, needle: &str, path: &str) -> Self {
        self.clicks
            .push((needle.to_lowercase(), path.to_string()));
        self
    }

    pub fn sets_cookie(mut self, path: &str, name: &str, value: &str) -> Self {
        self.cookies_on_visit
            .insert(path.to_string(), (name.to_string(), value.to_string()));
        self
    }

    pub fn sets_storage(mut self, path: &str, key: &str, value: &str) -> Self {
        self.storage_on_visit
            .insert(path.to_string(), (key.to_string(), value.to_string()));
        self
    }
}

/// Form controls a label target reaches, mirroring the alternatives of
/// `target_to_selector`: `aria-label`, `name` or input `id` equal to the
/// label, or a control nested in a `<label>` whose text contains it.
fn labelled_controls(lower_html: &str, label: &str) -> usize {
    let by_attribute = ["aria-label", "name", "id"]
        .iter()
        .map(|attr| lower_html.matches(&format!("{}=\"{}\"", attr, label)).count())
        .sum::<usize>();

    let nested = lower_html
        .split("<label")
        .skip(1)
        .filter_map(|rest| rest.split("</label>").next())
        .filter(|body| visible_text(&format!("<label{}", body)).to_lowercase().contains(label))
        .map(|body| {
            ["<input", "<textarea", "<select"]
                .iter()
                .map(|tag| body.matches(tag).count())
                .sum::<usize>()
        })
        .sum::<usize>();

    by_attribute + nested
}

fn split_url(url: &str) -> (String, String) {
    let (origin, path) = match url.find("://") {
        Some(i) => match url[i + 3..].find('/') {
            Some(j) => (&url[..i + 3 + j], &url[i + 3 + j..]),
            None => (url, "/"),
        },
        None => ("", url),
    };
    let path = path.split(['?', '#']).next().unwrap_or("/");
    (origin.to_string(), path.to_string())
}

// ============================================================================
// Browser
// ============================================================================

#[derive(Debug, Default)]
struct SessionState {
    cookies: Vec<StoredCookie>,
    storage: HashMap<String, String>,
    open_pages: usize,
    visited: Vec<String>,
    screenshots: Vec<PathBuf>,
    actions: Vec<String>,
    closed: bool,
    /// Successful `cookies()` reads left before they start failing.
    cookie_reads_left: Option<usize>,
}

pub struct FakeBrowser {
    site: Arc<FakeSite>,
    sessions: Mutex<Vec<FakeSession>>,
    fail_launch: bool,
    cookie_reads: Option<usize>,
}

impl FakeBrowser {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            sessions: Mutex::new(Vec::new()),
            fail_launch: false,
            cookie_reads: None,
        }
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// Sessions answer `reads` cookie reads, then every later read fails.
    pub fn cookie_reads_fail_after(mut self, reads: usize) -> Self {
        self.cookie_reads = Some(reads);
        self
    }

    /// Open a session directly, bypassing the launcher.
    pub fn session(&self) -> FakeSession {
        let session = FakeSession {
            site: self.site.clone(),
            state: Arc::new(Mutex::new(SessionState {
                cookie_reads_left: self.cookie_reads,
                ..Default::default()
            })),
            redirects: RedirectTracker::new(),
        };
        self.sessions.lock().unwrap().push(session.clone());
        session
    }

    pub fn sessions(&self) -> Vec<FakeSession> {
        self.sessions.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        if self.fail_launch {
            return Err(anyhow!("browser executable not found"));
        }
        Ok(Box::new(self.session()))
    }
}

#[derive(Clone)]
pub struct FakeSession {
    site: Arc<FakeSite>,
    state: Arc<Mutex<SessionState>>,
    redirects: RedirectTracker,
}

impl FakeSession {
    pub fn add_cookie(&self, name: &str, value: &str) {
        set_cookie(&mut self.state.lock().unwrap().cookies, name, value);
    }

    pub fn cookie_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .cookies
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn open_pages(&self) -> usize {
        self.state.lock().unwrap().open_pages
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().screenshots.clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

fn set_cookie(cookies: &mut Vec<StoredCookie>, name: &str, value: &str) {
    cookies.retain(|c| c.name != name);
    cookies.push(StoredCookie {
        name: name.to_string(),
        value: value.to_string(),
        domain: Some("localhost".to_string()),
        path: Some("/".to_string()),
        secure: Some(false),
        http_only: Some(true),
    });
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        self.state.lock().unwrap().open_pages += 1;
        Ok(Box::new(FakePage {
            site: self.site.clone(),
            state: self.state.clone(),
            redirects: self.redirects.clone(),
            current: Mutex::new(Current {
                url: "about:blank".to_string(),
                title: String::new(),
                html: String::new(),
            }),
        }))
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        let mut state = self.state.lock().unwrap();
        match state.cookie_reads_left.as_mut() {
            Some(0) => return Err(anyhow!("browser context is gone")),
            Some(left) => *left -= 1,
            None => {}
        }
        Ok(state.cookies.clone())
    }

    async fn clear_cookies(&self) -> Result<()> {
        self.state.lock().unwrap().cookies.clear();
        Ok(())
    }

    fn redirects(&self) -> RedirectTracker {
        self.redirects.clone()
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

struct Current {
    url: String,
    title: String,
    html: String,
}

struct FakePage {
    site: Arc<FakeSite>,
    state: Arc<Mutex<SessionState>>,
    redirects: RedirectTracker,
    current: Mutex<Current>,
}

impl FakePage {
    fn load(&self, url: &str) -> NavigationOutcome {
        let (origin, mut path) = split_url(url);

        for _ in 0..10 {
            let Some((status, to)) = self.site.redirects.get(&path) else {
                break;
            };
            self.redirects
                .record(&format!("{}{}", origin, path), *status, Some(to.clone()));
            path = split_url(to).1;
        }

        let final_url = format!("{}{}", origin, path);
        let page = self.site.pages.get(&path).cloned().unwrap_or(SitePage {
            status: 404,
            title: "Not Found".to_string(),
            html: "<h1>404</h1>".to_string(),
        });
        self.redirects.record(&final_url, page.status, None);

        {
            let mut state = self.state.lock().unwrap();
            if let Some((name, value)) = self.site.cookies_on_visit.get(&path) {
                set_cookie(&mut state.cookies, name, value);
            }
            if let Some((key, value)) = self.site.storage_on_visit.get(&path) {
                state.storage.insert(key.clone(), value.clone());
            }
        }

        *self.current.lock().unwrap() = Current {
            url: final_url.clone(),
            title: page.title,
            html: page.html,
        };

        NavigationOutcome {
            status: Some(page.status),
            final_url,
        }
    }

    fn html(&self) -> String {
        self.current.lock().unwrap().html.clone()
    }

    fn matches(&self, target: &Target) -> usize {
        let html = self.html();
        let lower_html = html.to_lowercase();
        let text = visible_text(&html).to_lowercase();
        let count = |haystack: &str, needle: &str| haystack.matches(&needle.to_lowercase()).count();

        if let Some(name) = target.name.as_ref().or(target.text.as_ref()) {
            return count(&text, name);
        }
        if let Some(label) = &target.label {
            return labelled_controls(&lower_html, &label.to_lowercase());
        }
        if let Some(attr) = target.placeholder.as_ref().or(target.test_id.as_ref()) {
            return count(&lower_html, attr);
        }
        if let Some(css) = &target.css {
            return count(&lower_html, css.trim_start_matches(['#', '.']));
        }
        match target.role.as_deref() {
            Some("heading") => count(&lower_html, "<h1") + count(&lower_html, "<h2"),
            Some("button") => count(&lower_html, "<button"),
            Some("link") => count(&lower_html, "<a "),
            Some(role) => count(&lower_html, &format!("role=\"{}\"", role)),
            None => 0,
        }
    }

    fn require(&self, target: &Target) -> Result<()> {
        if self.matches(target) == 0 {
            return Err(anyhow!("element not found: {}", target.describe()));
        }
        Ok(())
    }

    fn record(&self, action: String) {
        self.state.lock().unwrap().actions.push(action);
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str, _timeout_ms: u64) -> Result<NavigationOutcome> {
        self.state.lock().unwrap().visited.push(url.to_string());
        Ok(self.load(url))
    }

    async fn content(&self) -> Result<String> {
        Ok(self.html())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.current.lock().unwrap().url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.current.lock().unwrap().title.clone())
    }

    async fn is_visible(&self, target: &Target) -> Result<bool> {
        Ok(self.matches(target) > 0)
    }

    async fn count(&self, target: &Target) -> Result<usize> {
        Ok(self.matches(target))
    }

    async fn click(&self, target: &Target, _timeout_ms: u64) -> Result<()> {
        self.require(target)?;
        self.record(format!("click({})", target.describe()));

        let described = target.describe().to_lowercase();
        let destination = self
            .site
            .clicks
            .iter()
            .find(|(needle, _)| described.contains(needle.as_str()))
            .map(|(_, path)| path.clone());
        if let Some(path) = destination {
            let (origin, _) = split_url(&self.current.lock().unwrap().url);
            self.load(&format!("{}{}", origin, path));
        }
        Ok(())
    }

    async fn fill(&self, target: &Target, value: &str, _timeout_ms: u64) -> Result<()> {
        self.require(target)?;
        self.record(format!("fill({}, {})", target.describe(), value));
        Ok(())
    }

    async fn select_option(&self, target: &Target, value: &str, _timeout_ms: u64) -> Result<()> {
        self.require(target)?;
        self.record(format!("select({}, {})", target.describe(), value));
        Ok(())
    }

    async fn check(&self, target: &Target, _timeout_ms: u64) -> Result<()> {
        self.require(target)?;
        self.record(format!("check({})", target.describe()));
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<()> {
        self.record(format!("press({})", key));
        Ok(())
    }

    async fn computed_style(&self, target: &Target, property: &str) -> Result<String> {
        Err(anyhow!(
            "no computed '{}' for {} in fake browser",
            property,
            target.describe()
        ))
    }

    async fn local_storage(&self) -> Result<HashMap<String, String>> {
        Ok(self.state.lock().unwrap().storage.clone())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.state.lock().unwrap().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.open_pages = state.open_pages.saturating_sub(1);
        Ok(())
    }
}
