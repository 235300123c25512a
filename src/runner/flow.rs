//! Flow runner: ordered steps on one page with carried browser state
//!
//! A flow owns a single browser session and page for its whole run, so
//! cookies and storage written by one step are visible to the next. The
//! first failing step stops the flow; the remaining steps are reported as
//! not attempted.

use super::context::RunContext;
use super::engine::ExecutionEngine;
use super::events::TestEvent;
use super::state::{FlowResult, FlowSession, FlowStatus};
use super::synthesizer::{SynthesisInput, SynthesisMode, Synthesizer};
use crate::driver::{BrowserLauncher, BrowserSession, PageHandle};
use crate::error::{EnsureError, EnsureResult};
use crate::llm::TextGenerator;
use crate::parser::types::join_url;
use crate::parser::{FlowDefinition, FlowStep};
use crate::utils::html::reduce_html;
use std::time::Instant;

/// Run `flow` to completion or to its first failing step.
pub async fn run_flow(
    ctx: &RunContext,
    launcher: &dyn BrowserLauncher,
    generator: &dyn TextGenerator,
    flow: &FlowDefinition,
) -> FlowResult {
    let start = Instant::now();
    ctx.events.emit(TestEvent::FlowStarted {
        flow_name: flow.name.clone(),
        step_count: flow.steps.len(),
    });

    let mut result = FlowResult {
        name: flow.name.clone(),
        description: flow.description.clone(),
        source_path: flow.source_path.clone(),
        status: FlowStatus::Idle,
        steps: flow.steps.clone(),
        session: FlowSession::new(flow),
        error: None,
        duration_ms: 0,
    };

    match open(launcher).await {
        Ok((session, page)) => {
            run_steps(ctx, session.as_ref(), page.as_ref(), generator, &mut result).await;
            if let Err(e) = page.close().await {
                log::warn!("Failed to close flow page: {:#}", e);
            }
            if let Err(e) = session.close().await {
                log::warn!("Failed to close flow session: {:#}", e);
            }
        }
        Err(e) => {
            let message = format!("browser launch failed: {:#}", e);
            log::error!("Flow '{}': {}", flow.name, message);
            result.error = Some(message);
        }
    }

    if result.error.is_none() {
        result.status.complete();
    }

    for (idx, step) in result.steps.iter().enumerate() {
        if !step.attempted {
            ctx.events.emit(TestEvent::StepSkipped {
                index: idx,
                reason: "an earlier step failed".to_string(),
            });
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    ctx.events.emit(TestEvent::FlowFinished {
        flow_name: result.name.clone(),
        status: result.status.clone(),
        duration_ms: result.duration_ms,
    });
    result
}

async fn open(
    launcher: &dyn BrowserLauncher,
) -> anyhow::Result<(Box<dyn BrowserSession>, Box<dyn PageHandle>)> {
    let session = launcher.launch().await?;
    match session.new_page().await {
        Ok(page) => Ok((session, page)),
        Err(e) => {
            let _ = session.close().await;
            Err(e)
        }
    }
}

async fn run_steps(
    ctx: &RunContext,
    session: &dyn BrowserSession,
    page: &dyn PageHandle,
    generator: &dyn TextGenerator,
    result: &mut FlowResult,
) {
    let synthesizer = Synthesizer::new(generator).with_limits(ctx.max_tokens, ctx.temperature);
    let engine = ExecutionEngine::new(ctx.timeout_ms);

    for idx in 0..result.steps.len() {
        if !result.status.advance(idx) {
            break;
        }
        let started = Instant::now();
        let description = result.session.substitute(&result.steps[idx].description);
        ctx.events.emit(TestEvent::StepStarted {
            index: idx,
            description: description.clone(),
        });

        let outcome = run_step(
            ctx,
            &engine,
            &synthesizer,
            session,
            page,
            &description,
            &mut result.steps[idx],
            &result.session,
        )
        .await;

        let screenshot = ctx.screenshot_path(&result.name, &format!("step-{}", idx + 1));
        match page.screenshot(&screenshot).await {
            Ok(()) => result.steps[idx].screenshot_path = Some(screenshot.display().to_string()),
            Err(e) => log::debug!("No screenshot for step {}: {:#}", idx + 1, e),
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                result.steps[idx].pass();
                let cookies = match session.cookies().await {
                    Ok(cookies) => Some(cookies),
                    Err(e) => {
                        keep_previous(ctx, &result.name, idx, "cookies", &e);
                        None
                    }
                };
                let storage = match page.local_storage().await {
                    Ok(storage) => Some(storage),
                    Err(e) => {
                        keep_previous(ctx, &result.name, idx, "local storage", &e);
                        None
                    }
                };
                result.session.snapshot(idx, cookies, storage);
                ctx.events.emit(TestEvent::StepPassed { index: idx, duration_ms });
            }
            Err(e) => {
                let error = e.to_string();
                log::warn!("Flow '{}' step {} failed: {}", result.name, idx + 1, error);
                result.steps[idx].fail(error.clone());
                result.status.fail();
                ctx.events.emit(TestEvent::StepFailed {
                    index: idx,
                    error,
                    duration_ms,
                });
                break;
            }
        }
    }
}

fn keep_previous(ctx: &RunContext, flow: &str, idx: usize, what: &str, err: &anyhow::Error) {
    let message = format!(
        "Flow '{}' step {}: could not read {}, keeping the previous snapshot ({:#})",
        flow,
        idx + 1,
        what,
        err
    );
    log::warn!("{}", message);
    ctx.events.log(message);
}

#[allow(clippy::too_many_arguments)]
async fn run_step(
    ctx: &RunContext,
    engine: &ExecutionEngine,
    synthesizer: &Synthesizer<'_>,
    session: &dyn BrowserSession,
    page: &dyn PageHandle,
    description: &str,
    step: &mut FlowStep,
    carried: &FlowSession,
) -> EnsureResult<()> {
    if let Some(url) = &step.url {
        let url = join_url(&ctx.base_url, &carried.substitute(url));
        engine.navigate(page, &url).await?;
    }

    let html = page
        .content()
        .await
        .map_err(|e| EnsureError::execution(format!("could not read page content: {:#}", e)))?;
    let current_url = page.url().await.unwrap_or_else(|_| ctx.base_url.clone());
    let redirect_chain = session.redirects().snapshot();

    let synthesis = synthesizer
        .synthesize(&SynthesisInput {
            html: &reduce_html(&html, ctx.html_budget),
            expectation: description,
            current_url: &current_url,
            redirect_chain: &redirect_chain,
            mode: SynthesisMode::Flow,
        })
        .await?;
    step.generated_code = Some(synthesis.code);

    engine
        .execute_on_page(session, page, &synthesis.program, &ctx.base_url)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_flow_document;
    use crate::runner::events::EventEmitter;
    use crate::testing::{FakeBrowser, FakeSite, ScriptedGenerator};
    use crate::utils::Config;

    fn context(dir: &std::path::Path) -> RunContext {
        let config = Config {
            output_dir: dir.to_path_buf(),
            timeout_ms: 100,
            ..Default::default()
        };
        RunContext::new(&config, EventEmitter::default())
    }

    fn flow(doc: &str) -> FlowDefinition {
        parse_flow_document(doc, "flow").unwrap().remove(0)
    }

    fn site() -> FakeSite {
        FakeSite::new()
            .page("/login", 200, "Login", "<form><input name=\"email\"><button>Sign in</button></form>")
            .page("/dashboard", 200, "Dashboard", "<h1>Welcome back</h1>")
            .on_click("sign in", "/dashboard")
            .sets_cookie("/dashboard", "sid", "abc")
            .sets_storage("/dashboard", "theme", "dark")
    }

    #[tokio::test]
    async fn test_flow_carries_state_between_steps() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let browser = FakeBrowser::new(site());
        let generator = ScriptedGenerator::new(vec![
            Ok(r#"[{"action": "fill", "target": {"label": "email"}, "value": "a@b.com"}, {"action": "click", "target": {"role": "button", "name": "Sign in"}}]"#.into()),
            Ok(r#"[{"action": "expectText", "text": "Welcome back"}, {"action": "expectCookie", "name": "sid"}]"#.into()),
        ]);
        let flow = flow("# Login\n@username = a@b.com\n1. Go to /login and sign in as @username\n2. The dashboard says Welcome back\n");

        let result = run_flow(&ctx, &browser, &generator, &flow).await;

        assert_eq!(result.status, FlowStatus::Completed);
        assert!(result.passed());
        assert!(result.steps.iter().all(|s| s.attempted && s.passed));
        assert!(generator.prompts()[0].contains("sign in as a@b.com"));
        assert!(!generator.prompts()[0].contains("@username"));
        assert_eq!(result.session.current_step, 1);
        assert_eq!(result.session.cookies[0].name, "sid");
        assert_eq!(result.session.local_storage.get("theme").map(String::as_str), Some("dark"));
        assert!(result.steps[0].screenshot_path.is_some());

        let session = &browser.sessions()[0];
        assert!(session.is_closed());
        assert_eq!(session.open_pages(), 0);
    }

    #[tokio::test]
    async fn test_failing_step_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let browser = FakeBrowser::new(site());
        let generator = ScriptedGenerator::new(vec![
            Ok(r#"[{"action": "expectTitle", "contains": "Login"}]"#.into()),
            Ok(r#"[{"action": "expectText", "text": "Forgot password"}]"#.into()),
            Ok(r#"[{"action": "expectPageLoaded"}]"#.into()),
        ]);
        let flow = flow("# Recovery\n1. Visit /login\n2. See Forgot password\n3. The page is fine\n");

        let result = run_flow(&ctx, &browser, &generator, &flow).await;

        assert_eq!(result.status, FlowStatus::Failed { step_index: 1 });
        assert!(!result.passed());
        assert!(result.steps[0].passed);
        assert!(result.steps[1].attempted && !result.steps[1].passed);
        assert!(result.steps[1].error.is_some());
        assert!(!result.steps[2].attempted);
        assert!(result.steps[2].generated_code.is_none());
        assert_eq!(result.skipped_count(), 1);
        assert_eq!(generator.remaining(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_fails_the_step() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let browser = FakeBrowser::new(site());
        let generator = ScriptedGenerator::new(vec![Err(EnsureError::Generation(
            "rate limited".into(),
        ))]);
        let flow = flow("# Login\n1. Visit /login\n2. Sign in\n");

        let result = run_flow(&ctx, &browser, &generator, &flow).await;
        assert_eq!(result.status, FlowStatus::Failed { step_index: 0 });
        assert!(result.steps[0].error.as_deref().unwrap().contains("rate limited"));
        assert!(result.steps[0].generated_code.is_none());
    }

    #[tokio::test]
    async fn test_launch_failure_attempts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let browser = FakeBrowser::new(site()).failing_launch();
        let generator = ScriptedGenerator::new(vec![]);
        let flow = flow("# Login\n1. Visit /login\n");

        let result = run_flow(&ctx, &browser, &generator, &flow).await;
        assert_eq!(result.status, FlowStatus::Idle);
        assert!(result.error.is_some());
        assert!(!result.passed());
        assert_eq!(result.skipped_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_state_read_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().to_path_buf(),
            timeout_ms: 100,
            ..Default::default()
        };
        let (events, mut rx) = EventEmitter::new();
        let ctx = RunContext::new(&config, events);

        let site = FakeSite::new()
            .page("/dashboard", 200, "Dashboard", "<h1>Welcome back</h1>")
            .page("/settings", 200, "Settings", "<h1>Settings</h1>")
            .sets_cookie("/dashboard", "sid", "abc")
            .sets_storage("/dashboard", "theme", "dark")
            .sets_storage("/settings", "lang", "en");
        let browser = FakeBrowser::new(site).cookie_reads_fail_after(1);
        let generator = ScriptedGenerator::new(vec![
            Ok(r#"[{"action": "expectText", "text": "Welcome back"}]"#.into()),
            Ok(r#"[{"action": "expectText", "text": "Settings"}]"#.into()),
        ]);
        let flow = flow("# Prefs
1. Visit /dashboard
2. Go to /settings
");

        let result = run_flow(&ctx, &browser, &generator, &flow).await;

        assert_eq!(result.status, FlowStatus::Completed);
        assert_eq!(result.session.current_step, 1);
        // cookies from step 1 survive the failed read in step 2
        assert_eq!(result.session.cookies.len(), 1);
        assert_eq!(result.session.cookies[0].name, "sid");
        // storage was readable and is up to date
        assert_eq!(result.session.local_storage.get("lang").map(String::as_str), Some("en"));
        assert_eq!(result.session.local_storage.get("theme").map(String::as_str), Some("dark"));

        let mut logged = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TestEvent::Log { message } = event {
                logged.push(message);
            }
        }
        assert!(
            logged.iter().any(|m| m.contains("step 2: could not read cookies")),
            "{:?}",
            logged
        );
    }
}
