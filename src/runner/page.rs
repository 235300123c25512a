//! Page tests: one isolated browser session per page file
//!
//! A page is prepared (expectations extracted, route resolved) and then
//! tested: the target is loaded once for the basic checks and the HTML
//! snapshot, and every expectation runs on its own fresh page.

use super::context::RunContext;
use super::engine::ExecutionEngine;
use super::events::TestEvent;
use super::extractor::{Extractor, SplitMode};
use super::state::{BasicChecks, PageResult};
use super::synthesizer::{SynthesisInput, SynthesisMode, Synthesizer};
use crate::driver::{BrowserLauncher, BrowserSession, PageHandle, RedirectRecord};
use crate::llm::TextGenerator;
use crate::parser::comments::merge_comment_blocks;
use crate::parser::route::dynamic_params;
use crate::parser::{Expectation, PageTarget, RouteResolver};
use crate::utils::discovery::DiscoveredPage;
use crate::utils::html::reduce_html;
use std::time::Instant;

/// Outcome of preparing one discovered file.
#[derive(Debug)]
pub enum Prepared {
    /// No expectations; the file is left out of the run.
    Skipped,
    Ready(PageTarget),
    /// Expectations exist but the page cannot be tested.
    Failed(PageResult),
}

/// Extract expectations and resolve the route of a discovered file.
pub async fn prepare_page(
    ctx: &RunContext,
    resolver: &RouteResolver,
    generator: &dyn TextGenerator,
    page: &DiscoveredPage,
) -> Prepared {
    let params = dynamic_params(&page.file_path);
    let extraction = Extractor::new(generator)
        .with_limits(ctx.max_tokens, ctx.temperature)
        .extract(&page.source_text, &SplitMode::for_params(&params))
        .await;

    if extraction.expectations.is_empty() {
        log::debug!("{}: no expectations, skipping", page.file_path);
        return Prepared::Skipped;
    }

    match resolver.resolve(&page.file_path, &extraction.url_params) {
        Ok(route) => {
            let mut target = PageTarget::new(&page.file_path, &route, &ctx.base_url);
            target.raw_expectations = merge_comment_blocks(&page.source_text)
                .into_iter()
                .map(|c| c.text)
                .collect();
            target.expectations = extraction.expectations;
            target.url_params = extraction.url_params;
            Prepared::Ready(target)
        }
        Err(e) => {
            let message = e.to_string();
            log::warn!("{}", message);
            let mut expectations = extraction.expectations;
            fail_all(&mut expectations, &message);
            Prepared::Failed(PageResult {
                file_path: page.file_path.clone(),
                route: String::new(),
                url: String::new(),
                basic_checks: BasicChecks::default(),
                expectations,
                url_params: extraction.url_params,
                error: Some(message),
                duration_ms: 0,
            })
        }
    }
}

/// Test every expectation of `target` in a dedicated browser session.
pub async fn test_page(
    ctx: &RunContext,
    launcher: &dyn BrowserLauncher,
    generator: &dyn TextGenerator,
    target: PageTarget,
) -> PageResult {
    let start = Instant::now();
    ctx.events.emit(TestEvent::PageStarted {
        file_path: target.file_path.clone(),
        url: target.url.clone(),
        expectation_count: target.expectations.len(),
    });

    let mut result = PageResult {
        file_path: target.file_path,
        route: target.route,
        url: target.url,
        basic_checks: BasicChecks::default(),
        expectations: target.expectations,
        url_params: target.url_params,
        error: None,
        duration_ms: 0,
    };

    match launcher.launch().await {
        Ok(session) => {
            run_page(ctx, session.as_ref(), generator, &mut result).await;
            if let Err(e) = session.close().await {
                log::warn!("Failed to close browser session: {:#}", e);
            }
        }
        Err(e) => {
            let message = format!("browser launch failed: {:#}", e);
            fail_all(&mut result.expectations, &message);
            result.error = Some(message);
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    ctx.events.emit(TestEvent::PageFinished {
        file_path: result.file_path.clone(),
        passed: result.passed_count(),
        total: result.expectations.len(),
        error: result.error.clone(),
        duration_ms: result.duration_ms,
    });
    result
}

/// Initial load of the target page.
struct Snapshot {
    html: String,
    current_url: String,
    redirect_chain: Vec<RedirectRecord>,
}

async fn run_page(
    ctx: &RunContext,
    session: &dyn BrowserSession,
    generator: &dyn TextGenerator,
    result: &mut PageResult,
) {
    let snapshot = match load_page(ctx, session, result).await {
        Ok(snapshot) => snapshot,
        Err(message) => {
            fail_all(&mut result.expectations, &message);
            result.error = Some(message);
            return;
        }
    };

    let synthesizer = Synthesizer::new(generator)
        .with_limits(ctx.max_tokens, ctx.temperature)
        .with_policy(ctx.interaction_policy);
    let engine = ExecutionEngine::new(ctx.timeout_ms);

    for (idx, expectation) in result.expectations.iter_mut().enumerate() {
        let started = Instant::now();
        ctx.events.emit(TestEvent::ExpectationStarted {
            index: idx,
            text: expectation.text.clone(),
        });

        let input = SynthesisInput {
            html: &snapshot.html,
            expectation: &expectation.text,
            current_url: &snapshot.current_url,
            redirect_chain: &snapshot.redirect_chain,
            mode: SynthesisMode::Page,
        };

        let outcome = match synthesizer.synthesize(&input).await {
            Ok(synthesis) => {
                expectation.generated_code = Some(synthesis.code);
                let screenshot =
                    ctx.screenshot_path(&result.file_path, &format!("expectation-{}", idx + 1));
                engine
                    .execute_isolated(session, &synthesis.program, &result.url, Some(&screenshot))
                    .await
            }
            Err(e) => Err(e),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                expectation.pass();
                ctx.events.emit(TestEvent::ExpectationPassed {
                    index: idx,
                    duration_ms,
                });
            }
            Err(e) => {
                let error = e.to_string();
                log::debug!("{} #{} failed: {}", result.file_path, idx + 1, error);
                expectation.fail(error.clone());
                ctx.events.emit(TestEvent::ExpectationFailed {
                    index: idx,
                    error,
                    duration_ms,
                });
            }
        }
    }
}

/// Navigate once, fill in the basic checks and capture what synthesis needs.
async fn load_page(
    ctx: &RunContext,
    session: &dyn BrowserSession,
    result: &mut PageResult,
) -> Result<Snapshot, String> {
    let page = session
        .new_page()
        .await
        .map_err(|e| format!("could not open page: {:#}", e))?;

    let loaded = capture(ctx, session, page.as_ref(), result).await;

    if let Err(e) = page.close().await {
        log::warn!("Failed to close page: {:#}", e);
    }
    loaded
}

async fn capture(
    ctx: &RunContext,
    session: &dyn BrowserSession,
    page: &dyn PageHandle,
    result: &mut PageResult,
) -> Result<Snapshot, String> {
    let outcome = page
        .goto(&result.url, ctx.timeout_ms)
        .await
        .map_err(|e| format!("page failed to load: {:#}", e))?;

    result.basic_checks.status = outcome.status;
    result.basic_checks.page_loaded = outcome.is_success();
    result.basic_checks.title = page.title().await.ok().filter(|t| !t.trim().is_empty());

    if !outcome.is_success() {
        return Err(format!(
            "page failed to load: HTTP {}",
            outcome.status.unwrap_or(0)
        ));
    }

    let html = page
        .content()
        .await
        .map_err(|e| format!("could not read page content: {:#}", e))?;
    let current_url = page.url().await.unwrap_or_else(|_| result.url.clone());

    Ok(Snapshot {
        html: reduce_html(&html, ctx.html_budget),
        current_url,
        redirect_chain: session.redirects().snapshot(),
    })
}

fn fail_all(expectations: &mut [Expectation], message: &str) {
    for expectation in expectations {
        expectation.fail(message);
    }
}
