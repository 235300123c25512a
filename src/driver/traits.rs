use crate::driver::redirect::RedirectTracker;
use crate::dsl::Target;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Browser cookie as carried between flow steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default)]
    pub http_only: Option<bool>,
}

/// Outcome of a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOutcome {
    /// Status of the final document response; `None` for same-document
    /// navigations where the browser reports no response.
    pub status: Option<u16>,
    pub final_url: String,
}

impl NavigationOutcome {
    pub fn is_success(&self) -> bool {
        self.status.map(|s| s < 400).unwrap_or(true)
    }
}

/// Launches isolated browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One browser context: shared cookie jar, one redirect log, many pages.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>>;

    async fn cookies(&self) -> Result<Vec<StoredCookie>>;

    async fn clear_cookies(&self) -> Result<()>;

    /// Redirect log fed by every page of this session.
    fn redirects(&self) -> RedirectTracker;

    async fn close(&self) -> Result<()>;
}

/// Page-level capabilities the execution engine interprets instructions with.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn goto(&self, url: &str, timeout_ms: u64) -> Result<NavigationOutcome>;

    /// Rendered HTML of the current document.
    async fn content(&self) -> Result<String>;

    async fn url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn is_visible(&self, target: &Target) -> Result<bool>;

    async fn count(&self, target: &Target) -> Result<usize>;

    async fn click(&self, target: &Target, timeout_ms: u64) -> Result<()>;

    async fn fill(&self, target: &Target, value: &str, timeout_ms: u64) -> Result<()>;

    async fn select_option(&self, target: &Target, value: &str, timeout_ms: u64) -> Result<()>;

    async fn check(&self, target: &Target, timeout_ms: u64) -> Result<()>;

    async fn press(&self, key: &str) -> Result<()>;

    /// Computed CSS value of `property` on the first matching element.
    async fn computed_style(&self, target: &Target, property: &str) -> Result<String>;

    async fn local_storage(&self) -> Result<HashMap<String, String>>;

    /// Full-page screenshot.
    async fn screenshot(&self, path: &Path) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
