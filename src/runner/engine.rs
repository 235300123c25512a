//! Instruction interpreter
//!
//! Programs run either on a fresh isolated page (page expectations) or on an
//! existing page whose state must persist (flow steps). Every failure is an
//! `EnsureError` the caller turns into a failed result; nothing panics out.

use crate::driver::common::{normalize_whitespace, wait_until, PollConfig};
use crate::driver::{BrowserSession, PageHandle, RedirectRecord, RedirectTracker};
use crate::dsl::{Instruction, Program};
use crate::error::{EnsureError, EnsureResult};
use crate::utils::html::visible_text;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

pub struct ExecutionEngine {
    timeout_ms: u64,
}

impl ExecutionEngine {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    /// Run `program` on a new page of `session` with cookies cleared.
    ///
    /// Navigates to `target_url` first unless the program opens with its own
    /// navigation. A screenshot is written to `failure_screenshot` when the
    /// program fails. The page is closed on every path.
    pub async fn execute_isolated(
        &self,
        session: &dyn BrowserSession,
        program: &Program,
        target_url: &str,
        failure_screenshot: Option<&Path>,
    ) -> EnsureResult<()> {
        let page = session.new_page().await.map_err(driver_error)?;

        let result = self
            .run_isolated(session, page.as_ref(), program, target_url, failure_screenshot)
            .await;

        if let Err(e) = page.close().await {
            log::warn!("Failed to close isolated page: {:#}", e);
        }
        result
    }

    async fn run_isolated(
        &self,
        session: &dyn BrowserSession,
        page: &dyn PageHandle,
        program: &Program,
        target_url: &str,
        failure_screenshot: Option<&Path>,
    ) -> EnsureResult<()> {
        // only responses from this page count towards its redirect checks
        let tracker = session.redirects().from_now();
        session.clear_cookies().await.map_err(driver_error)?;

        if !program.starts_with_navigation() {
            self.navigate(page, target_url).await?;
        }

        let result = self
            .run_program(session, page, program, target_url, &tracker)
            .await;

        if result.is_err() {
            if let Some(path) = failure_screenshot {
                match page.screenshot(path).await {
                    Ok(()) => log::debug!("Failure screenshot: {}", path.display()),
                    Err(e) => log::warn!("Could not capture failure screenshot: {:#}", e),
                }
            }
        }
        result
    }

    /// Run `program` on `page` as is, keeping whatever state it has.
    ///
    /// Relative `navigate` urls resolve against `base_url`. Redirect checks
    /// see every response the session has observed.
    pub async fn execute_on_page(
        &self,
        session: &dyn BrowserSession,
        page: &dyn PageHandle,
        program: &Program,
        base_url: &str,
    ) -> EnsureResult<()> {
        let tracker = session.redirects();
        self.run_program(session, page, program, base_url, &tracker)
            .await
    }

    async fn run_program(
        &self,
        session: &dyn BrowserSession,
        page: &dyn PageHandle,
        program: &Program,
        base_url: &str,
        tracker: &RedirectTracker,
    ) -> EnsureResult<()> {
        for (idx, instruction) in program.instructions.iter().enumerate() {
            log::debug!("  [{}] {}", idx + 1, instruction.label());
            if let Err(e) = self
                .step(session, page, instruction, tracker, base_url)
                .await
            {
                if program.references_redirects() {
                    log::warn!(
                        "{} failed with redirect chain: {}",
                        instruction.label(),
                        tracker.describe()
                    );
                }
                let detail = match e {
                    EnsureError::Execution(msg) => msg,
                    other => other.to_string(),
                };
                return Err(EnsureError::Execution(format!(
                    "step {} {}: {}",
                    idx + 1,
                    instruction.label(),
                    detail
                )));
            }
        }
        Ok(())
    }

    /// Navigate and require a non-error status.
    pub async fn navigate(&self, page: &dyn PageHandle, url: &str) -> EnsureResult<()> {
        let outcome = page
            .goto(url, self.timeout_ms)
            .await
            .map_err(|e| EnsureError::Navigation {
                url: url.to_string(),
                reason: format!("{:#}", e),
            })?;
        if !outcome.is_success() {
            return Err(EnsureError::Navigation {
                url: url.to_string(),
                reason: format!("HTTP {}", outcome.status.unwrap_or(0)),
            });
        }
        Ok(())
    }

    fn poll_config(&self) -> PollConfig {
        PollConfig::with_timeout(self.timeout_ms)
    }

    async fn poll<F, Fut>(&self, check: F) -> bool
    where
        F: Fn() -> Fut,
        Fut: Future<Output = bool>,
    {
        wait_until(check, self.poll_config()).await
    }

    fn timeout(&self, what: String) -> EnsureError {
        EnsureError::Timeout {
            what,
            timeout_ms: self.timeout_ms,
        }
    }

    async fn step(
        &self,
        session: &dyn BrowserSession,
        page: &dyn PageHandle,
        instruction: &Instruction,
        tracker: &RedirectTracker,
        base_url: &str,
    ) -> EnsureResult<()> {
        match instruction {
            Instruction::Navigate { url } => {
                self.navigate(page, &resolve_url(base_url, url)).await
            }

            Instruction::ExpectPageLoaded => {
                let url = page.url().await.map_err(driver_error)?;
                let html = page.content().await.map_err(driver_error)?;
                if url == "about:blank" || html.trim().is_empty() {
                    return Err(EnsureError::Execution("page has no document".into()));
                }
                Ok(())
            }

            Instruction::ExpectTitle { contains } => {
                let ok = self
                    .poll(move || async move {
                        page.title()
                            .await
                            .map(|t| contains_text(&t, contains))
                            .unwrap_or(false)
                    })
                    .await;
                if ok {
                    Ok(())
                } else {
                    let title = page.title().await.unwrap_or_default();
                    Err(EnsureError::Execution(format!(
                        "title '{}' does not contain '{}'",
                        title, contains
                    )))
                }
            }

            Instruction::ExpectText { text } => {
                let ok = self
                    .poll(move || async move { page_has_text(page, text).await })
                    .await;
                if ok {
                    Ok(())
                } else {
                    Err(self.timeout(format!("text '{}' to appear", text)))
                }
            }

            Instruction::ExpectNoText { text } => {
                let ok = self
                    .poll(move || async move { !page_has_text(page, text).await })
                    .await;
                if ok {
                    Ok(())
                } else {
                    Err(EnsureError::Execution(format!(
                        "text '{}' is still on the page",
                        text
                    )))
                }
            }

            Instruction::ExpectVisible { target } | Instruction::WaitFor { target } => {
                let ok = self
                    .poll(move || async move { page.is_visible(target).await.unwrap_or(false) })
                    .await;
                if ok {
                    Ok(())
                } else {
                    Err(self.timeout(format!("{} to be visible", target.describe())))
                }
            }

            Instruction::ExpectHidden { target } => {
                let ok = self
                    .poll(move || async move { !page.is_visible(target).await.unwrap_or(true) })
                    .await;
                if ok {
                    Ok(())
                } else {
                    Err(self.timeout(format!("{} to be hidden", target.describe())))
                }
            }

            Instruction::ExpectCount { target, count } => {
                let expected = *count;
                let ok = self
                    .poll(move || async move {
                        page.count(target).await.map(|n| n == expected).unwrap_or(false)
                    })
                    .await;
                if ok {
                    Ok(())
                } else {
                    let actual = page.count(target).await.map_err(driver_error)?;
                    Err(EnsureError::Execution(format!(
                        "expected {} of {}, found {}",
                        expected,
                        target.describe(),
                        actual
                    )))
                }
            }

            Instruction::ExpectUrl { contains } => {
                let ok = self
                    .poll(move || async move {
                        page.url()
                            .await
                            .map(|u| u.contains(contains.as_str()))
                            .unwrap_or(false)
                    })
                    .await;
                if ok {
                    Ok(())
                } else {
                    let url = page.url().await.unwrap_or_default();
                    Err(EnsureError::Execution(format!(
                        "URL '{}' does not contain '{}'",
                        url, contains
                    )))
                }
            }

            Instruction::ExpectRedirect { from, to, status } => {
                let (from, to, status) = (from.as_deref(), to.as_deref(), *status);
                let ok = self
                    .poll(move || async move {
                        let current = page.url().await.unwrap_or_default();
                        redirect_matches(&tracker.snapshot(), from, to, status, &current)
                    })
                    .await;
                if ok {
                    Ok(())
                } else {
                    Err(EnsureError::Execution(format!(
                        "no matching redirect (observed: {})",
                        tracker.describe()
                    )))
                }
            }

            Instruction::ExpectStyle {
                target,
                property,
                value,
            } => {
                let ok = self
                    .poll(move || async move {
                        page.computed_style(target, property)
                            .await
                            .map(|actual| style_matches(&actual, value))
                            .unwrap_or(false)
                    })
                    .await;
                if ok {
                    Ok(())
                } else {
                    let actual = page
                        .computed_style(target, property)
                        .await
                        .unwrap_or_else(|e| format!("<unavailable: {}>", e));
                    Err(EnsureError::Execution(format!(
                        "{} of {} is '{}', expected '{}'",
                        property,
                        target.describe(),
                        actual,
                        value
                    )))
                }
            }

            Instruction::ExpectCookie { name, value } => {
                let cookies = session.cookies().await.map_err(driver_error)?;
                match cookies.iter().find(|c| &c.name == name) {
                    None => Err(EnsureError::Execution(format!("cookie '{}' is not set", name))),
                    Some(c) => match value {
                        Some(expected) if &c.value != expected => Err(EnsureError::Execution(
                            format!("cookie '{}' is '{}', expected '{}'", name, c.value, expected),
                        )),
                        _ => Ok(()),
                    },
                }
            }

            Instruction::ExpectStorage { key, value } => {
                let storage = page.local_storage().await.map_err(driver_error)?;
                match storage.get(key) {
                    None => Err(EnsureError::Execution(format!(
                        "localStorage has no '{}'",
                        key
                    ))),
                    Some(actual) => match value {
                        Some(expected) if actual != expected => {
                            Err(EnsureError::Execution(format!(
                                "localStorage '{}' is '{}', expected '{}'",
                                key, actual, expected
                            )))
                        }
                        _ => Ok(()),
                    },
                }
            }

            Instruction::Click { target } => page
                .click(target, self.timeout_ms)
                .await
                .map_err(driver_error),

            Instruction::Fill { target, value } => page
                .fill(target, value, self.timeout_ms)
                .await
                .map_err(driver_error),

            Instruction::Select { target, value } => page
                .select_option(target, value, self.timeout_ms)
                .await
                .map_err(driver_error),

            Instruction::Check { target } => page
                .check(target, self.timeout_ms)
                .await
                .map_err(driver_error),

            Instruction::Press { key } => page.press(key).await.map_err(driver_error),

            Instruction::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis((*ms).min(self.timeout_ms))).await;
                Ok(())
            }
        }
    }
}

fn driver_error(err: anyhow::Error) -> EnsureError {
    EnsureError::Execution(format!("{:#}", err))
}

async fn page_has_text(page: &dyn PageHandle, text: &str) -> bool {
    match page.content().await {
        Ok(html) => contains_text(&visible_text(&html), text),
        Err(_) => false,
    }
}

/// Case-insensitive containment after whitespace normalization.
pub fn contains_text(haystack: &str, needle: &str) -> bool {
    normalize_whitespace(haystack)
        .to_lowercase()
        .contains(&normalize_whitespace(needle).to_lowercase())
}

/// Absolute `url` as is; otherwise joined onto the origin of `base`.
pub fn resolve_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    let origin = match base.find("://") {
        Some(scheme_end) => match base[scheme_end + 3..].find('/') {
            Some(path_start) => &base[..scheme_end + 3 + path_start],
            None => base,
        },
        None => base.trim_end_matches('/'),
    };
    if url.starts_with('/') {
        format!("{}{}", origin, url)
    } else {
        format!("{}/{}", origin, url)
    }
}

/// Redirect check against an observed chain.
///
/// A 3xx record matches when its url contains `from`, its location contains
/// `to` and its status equals `status` (each only if given). Without such a
/// record, a given `to` still passes when the current URL contains it and at
/// least one 3xx was observed.
pub fn redirect_matches(
    chain: &[RedirectRecord],
    from: Option<&str>,
    to: Option<&str>,
    status: Option<u16>,
    current_url: &str,
) -> bool {
    let redirects: Vec<&RedirectRecord> = chain.iter().filter(|r| r.is_redirect()).collect();

    let direct = redirects.iter().any(|r| {
        from.map_or(true, |f| r.url.contains(f))
            && to.map_or(true, |t| {
                r.location.as_deref().map_or(false, |loc| loc.contains(t))
            })
            && status.map_or(true, |s| r.status == s)
    });
    if direct {
        return true;
    }

    match to {
        Some(t) => !redirects.is_empty() && current_url.contains(t),
        None => false,
    }
}

/// Compare a computed style against an expected value, tolerating spacing,
/// case and a few named colors.
pub fn style_matches(actual: &str, expected: &str) -> bool {
    let squash = |s: &str| {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase()
    };
    let actual = squash(actual);
    let expected = squash(expected);
    if actual == expected {
        return true;
    }
    match named_color(&expected) {
        Some(rgb) => actual == rgb || actual.starts_with(&rgb.replace("rgb(", "rgba(").replace(')', ",1)")),
        None => false,
    }
}

fn named_color(name: &str) -> Option<String> {
    let rgb = match name {
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "gray" | "grey" => (128, 128, 128),
        "orange" => (255, 165, 0),
        "purple" => (128, 0, 128),
        _ => return None,
    };
    Some(format!("rgb({},{},{})", rgb.0, rgb.1, rgb.2))
}
