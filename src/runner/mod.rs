pub mod context;
pub mod engine;
pub mod events;
pub mod extractor;
pub mod flow;
pub mod page;
pub mod state;
pub mod synthesizer;

use crate::driver::BrowserLauncher;
use crate::llm::TextGenerator;
use crate::parser::{parse_flow_file, FlowDefinition, RouteResolver};
use crate::report::RunReport;
use crate::utils::discovery::{discover_flow_files, discover_pages};
use crate::utils::Config;
use std::path::Path;
use std::time::Instant;

pub use context::RunContext;
pub use events::*;
pub use state::*;

/// A flow document entry: either runnable or already failed to parse.
enum PlannedFlow {
    Run(FlowDefinition),
    Broken(FlowResult),
}

/// Discover, extract, synthesize and execute everything under the project.
///
/// Pages run one after another, each in its own browser session; flows run
/// after all pages. A failure in one page or flow never stops the others.
pub async fn run(
    config: &Config,
    launcher: &dyn BrowserLauncher,
    generator: &dyn TextGenerator,
    events: EventEmitter,
) -> RunReport {
    let start = Instant::now();
    let ctx = RunContext::new(config, events);
    let resolver = RouteResolver::new(Some(&config.project_root));

    let discovered = discover_pages(&config.project_root);
    let planned = plan_flows(&config.flows_path());
    let runnable = planned
        .iter()
        .filter(|p| matches!(p, PlannedFlow::Run(_)))
        .count();

    log::info!(
        "Session {}: {} candidate page(s), {} flow(s) against {}",
        ctx.session_id,
        discovered.len(),
        runnable,
        ctx.base_url
    );
    ctx.events.emit(TestEvent::RunStarted {
        session_id: ctx.session_id.clone(),
        page_count: discovered.len(),
        flow_count: planned.len(),
    });

    let mut pages = Vec::new();
    for candidate in &discovered {
        match page::prepare_page(&ctx, &resolver, generator, candidate).await {
            page::Prepared::Skipped => {}
            page::Prepared::Ready(target) => {
                pages.push(page::test_page(&ctx, launcher, generator, target).await);
            }
            page::Prepared::Failed(result) => {
                ctx.events.emit(TestEvent::PageFinished {
                    file_path: result.file_path.clone(),
                    passed: 0,
                    total: result.expectations.len(),
                    error: result.error.clone(),
                    duration_ms: 0,
                });
                pages.push(result);
            }
        }
    }

    let mut flows = Vec::new();
    for entry in planned {
        match entry {
            PlannedFlow::Run(definition) => {
                flows.push(flow::run_flow(&ctx, launcher, generator, &definition).await);
            }
            PlannedFlow::Broken(result) => flows.push(result),
        }
    }

    let report = RunReport::new(
        &ctx.session_id,
        &ctx.base_url,
        pages,
        flows,
        start.elapsed().as_millis() as u64,
    );
    ctx.events.emit(TestEvent::RunFinished {
        summary: report.summary.clone(),
    });
    report
}

fn plan_flows(flows_dir: &Path) -> Vec<PlannedFlow> {
    let mut planned = Vec::new();
    for path in discover_flow_files(flows_dir) {
        match parse_flow_file(&path) {
            Ok(definitions) => planned.extend(definitions.into_iter().map(PlannedFlow::Run)),
            Err(e) => {
                log::error!("Failed to parse flow file {}: {:#}", path.display(), e);
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "flow".to_string());
                planned.push(PlannedFlow::Broken(FlowResult {
                    name,
                    description: String::new(),
                    source_path: Some(path.display().to_string()),
                    status: FlowStatus::Idle,
                    steps: Vec::new(),
                    session: FlowSession::default(),
                    error: Some(format!("{:#}", e)),
                    duration_ms: 0,
                }));
            }
        }
    }
    planned
}
