use super::types::RunReport;
use crate::runner::state::{FlowResult, FlowStatus, PageResult};
use anyhow::Result;
use std::path::Path;

/// Generate HTML report
pub async fn generate(report: &RunReport, output: Option<&Path>) -> Result<()> {
    let html = generate_html(report);

    if let Some(path) = output {
        std::fs::write(path, html)?;
        println!("HTML report saved to: {}", path.display());
    } else {
        println!("{}", html);
    }

    Ok(())
}

/// Write `report.html` into `output_dir`.
pub fn write_report(report: &RunReport, output_dir: &Path) -> Result<()> {
    let path = output_dir.join("report.html");
    std::fs::write(&path, generate_html(report))?;
    log::info!("Generated HTML report: {}", path.display());
    Ok(())
}

pub fn generate_html(report: &RunReport) -> String {
    let summary = &report.summary;
    let checks = summary.total_expectations + summary.total_steps;
    let passed = summary.passed_expectations + summary.passed_steps;
    let failed = summary.failed_expectations + summary.failed_steps;
    let pass_rate = if checks > 0 {
        (passed as f64 / checks as f64 * 100.0) as u32
    } else {
        0
    };

    let pages_html: String = report.pages.iter().map(page_card).collect();
    let flows_html: String = report.flows.iter().map(flow_card).collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>ensure-ui report - {session}</title>
    <style>
        :root {{
            --bg-primary: #0a0f1d;
            --bg-secondary: #141b2d;
            --bg-tertiary: #1f2937;
            --border: #374151;
            --text-primary: #f9fafb;
            --text-secondary: #9ca3af;
            --green: #10b981;
            --red: #ef4444;
            --yellow: #f59e0b;
            --blue: #3b82f6;
        }}
        * {{ margin: 0; padding: 0; box-sizing: border-box; }}
        body {{
            font-family: system-ui, -apple-system, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.5;
            padding: 3rem 1rem;
        }}
        .container {{ max-width: 1100px; margin: 0 auto; }}
        header {{ margin-bottom: 2.5rem; display: flex; justify-content: space-between; align-items: flex-end; }}
        h1 {{ font-size: 2rem; font-weight: 800; }}
        h2 {{ font-size: 1.25rem; margin: 2.5rem 0 1rem; color: var(--text-secondary); text-transform: uppercase; letter-spacing: 0.05em; }}
        .summary {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(180px, 1fr)); gap: 1.25rem; margin-bottom: 2rem; }}
        .stat {{ background: var(--bg-secondary); border: 1px solid var(--border); padding: 1.25rem; border-radius: 1rem; }}
        .stat-value {{ font-size: 2.25rem; font-weight: 800; }}
        .stat-label {{ color: var(--text-secondary); font-size: 0.8rem; text-transform: uppercase; letter-spacing: 0.05em; }}
        .stat.passed .stat-value {{ color: var(--green); }}
        .stat.failed .stat-value {{ color: var(--red); }}
        .stat.skipped .stat-value {{ color: var(--yellow); }}
        .progress-bar {{ background: var(--bg-secondary); height: 12px; border-radius: 6px; overflow: hidden; border: 1px solid var(--border); }}
        .progress-fill {{ height: 100%; background: var(--green); }}
        .card {{ background: var(--bg-secondary); border: 1px solid var(--border); border-radius: 1rem; margin-bottom: 1.5rem; overflow: hidden; }}
        .card-header {{ padding: 1rem 1.5rem; display: flex; justify-content: space-between; align-items: center; border-bottom: 1px solid var(--border); }}
        .card-header h3 {{ font-size: 1.05rem; display: flex; gap: 0.75rem; align-items: center; }}
        .card-sub {{ color: var(--text-secondary); font-size: 0.8rem; padding: 0.5rem 1.5rem 0; }}
        .badge {{ padding: 0.15rem 0.6rem; border-radius: 9999px; font-size: 0.7rem; font-weight: 600; text-transform: uppercase; }}
        .card.passed .badge {{ background: rgba(16, 185, 129, 0.1); color: var(--green); }}
        .card.failed .badge {{ background: rgba(239, 68, 68, 0.1); color: var(--red); }}
        .items {{ padding: 0.75rem 1.5rem 1rem; }}
        .item {{ padding: 0.75rem; border-radius: 0.75rem; display: flex; gap: 1rem; margin-bottom: 0.25rem; }}
        .item:hover {{ background: var(--bg-tertiary); }}
        .item-icon {{ width: 1.75rem; height: 1.75rem; display: flex; align-items: center; justify-content: center; border-radius: 0.5rem; flex-shrink: 0; }}
        .item.passed .item-icon {{ background: rgba(16, 185, 129, 0.1); color: var(--green); }}
        .item.failed .item-icon {{ background: rgba(239, 68, 68, 0.1); color: var(--red); }}
        .item.skipped .item-icon {{ background: rgba(245, 158, 11, 0.1); color: var(--yellow); }}
        .item-content {{ flex: 1; min-width: 0; }}
        .item-meta {{ display: flex; gap: 1rem; margin-top: 0.25rem; font-size: 0.75rem; color: var(--text-secondary); }}
        .screenshot-link {{ color: var(--blue); font-weight: 600; text-decoration: none; }}
        details summary {{ cursor: pointer; color: var(--blue); font-size: 0.75rem; margin-top: 0.35rem; }}
        pre {{ background: rgba(0, 0, 0, 0.3); padding: 0.75rem; border-radius: 0.5rem; margin-top: 0.5rem; font-size: 0.75rem; overflow-x: auto; }}
        .error-message {{ background: rgba(239, 68, 68, 0.1); border-radius: 0.5rem; padding: 0.6rem; margin-top: 0.6rem; color: #fca5a5; font-size: 0.8rem; font-family: monospace; border: 1px solid rgba(239, 68, 68, 0.2); }}
        .meta {{ margin-top: 3rem; padding-top: 1.5rem; border-top: 1px solid var(--border); color: var(--text-secondary); font-size: 0.8rem; display: flex; justify-content: center; gap: 2rem; }}
        #modal {{ display: none; position: fixed; z-index: 100; inset: 0; background: rgba(0, 0, 0, 0.9); padding: 2rem; align-items: center; justify-content: center; }}
        #modal img {{ max-width: 100%; max-height: 100%; border-radius: 0.5rem; }}
        #modal.active {{ display: flex; }}
    </style>
</head>
<body>
    <div class="container">
        <header>
            <h1>UI Expectation Report</h1>
            <div style="text-align: right;">
                <div style="font-size: 0.8rem; color: var(--text-secondary);">{base_url}</div>
                <div style="font-size: 1.25rem; font-weight: 700;">{duration}</div>
            </div>
        </header>

        <div class="summary">
            <div class="stat"><div class="stat-value">{pages}</div><div class="stat-label">Pages</div></div>
            <div class="stat"><div class="stat-value">{flows}</div><div class="stat-label">Flows</div></div>
            <div class="stat passed"><div class="stat-value">{passed}</div><div class="stat-label">Passed</div></div>
            <div class="stat failed"><div class="stat-value">{failed}</div><div class="stat-label">Failed</div></div>
            <div class="stat skipped"><div class="stat-value">{skipped}</div><div class="stat-label">Not attempted</div></div>
        </div>

        <div style="display: flex; justify-content: space-between; margin-bottom: 0.5rem;">
            <span style="font-weight: 600; font-size: 0.875rem;">Success Rate</span>
            <span style="font-weight: 700; color: var(--green);">{pass_rate}%</span>
        </div>
        <div class="progress-bar"><div class="progress-fill" style="width: {pass_rate}%"></div></div>

        <h2>Pages</h2>
        {pages_html}

        <h2>Flows</h2>
        {flows_html}

        <div class="meta">
            <span>Session: {session}</span>
            <span>Generated: {generated_at}</span>
        </div>
    </div>

    <div id="modal" onclick="this.classList.remove('active')">
        <img id="modal-img" src="" alt="Screenshot">
    </div>

    <script>
        function showScreenshot(path) {{
            document.getElementById('modal-img').src = path;
            document.getElementById('modal').classList.add('active');
            event.stopPropagation();
        }}
    </script>
</body>
</html>"#,
        session = html_escape(&report.session_id),
        base_url = html_escape(&report.base_url),
        duration = format_duration(summary.duration_ms),
        pages = summary.total_pages,
        flows = summary.total_flows,
        passed = passed,
        failed = failed,
        skipped = summary.skipped_steps,
        pass_rate = pass_rate,
        pages_html = or_empty(pages_html, "No pages with expectations were found."),
        flows_html = or_empty(flows_html, "No flows were run."),
        generated_at = html_escape(&report.generated_at),
    )
}

fn page_card(page: &PageResult) -> String {
    let status_class = if page.passed() { "passed" } else { "failed" };

    let mut items = String::new();
    for exp in &page.expectations {
        let (icon, class) = if exp.passed { ("✓", "passed") } else { ("✗", "failed") };
        items.push_str(&item(
            class,
            icon,
            &format!("{} <span style=\"color: var(--text-secondary);\">line {}</span>", html_escape(&exp.text), exp.line_number),
            "",
            exp.generated_code.as_deref(),
            exp.error.as_deref(),
        ));
    }

    let checks = &page.basic_checks;
    let sub = format!(
        "{} &middot; HTTP {} &middot; {}",
        html_escape(&page.url),
        checks.status.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
        html_escape(checks.title.as_deref().unwrap_or("untitled")),
    );
    let page_error = page
        .error
        .as_deref()
        .map(|e| format!(r#"<div class="items"><div class="error-message">{}</div></div>"#, html_escape(e)))
        .unwrap_or_default();

    format!(
        r#"
        <div class="card {status_class}">
            <div class="card-header">
                <h3>{name} <span class="badge">{passed}/{total}</span></h3>
                <span class="item-meta">{duration}</span>
            </div>
            <div class="card-sub">{sub}</div>
            {page_error}
            <div class="items">{items}</div>
        </div>"#,
        name = html_escape(&page.file_path),
        passed = page.passed_count(),
        total = page.expectations.len(),
        duration = format_duration(page.duration_ms),
    )
}

fn flow_card(flow: &FlowResult) -> String {
    let status_class = if flow.passed() { "passed" } else { "failed" };
    let status_text = match flow.status {
        FlowStatus::Completed => "Completed".to_string(),
        FlowStatus::Failed { step_index } => format!("Failed at step {}", step_index + 1),
        FlowStatus::Running { .. } => "Interrupted".to_string(),
        FlowStatus::Idle => "Not started".to_string(),
    };

    let mut items = String::new();
    for step in &flow.steps {
        let (icon, class) = match (step.attempted, step.passed) {
            (false, _) => ("○", "skipped"),
            (true, true) => ("✓", "passed"),
            (true, false) => ("✗", "failed"),
        };
        let screenshot = step
            .screenshot_path
            .as_deref()
            .map(|path| {
                format!(
                    r##"<a href="#" class="screenshot-link" onclick="showScreenshot('{}')">View Screenshot</a>"##,
                    html_escape(path)
                )
            })
            .unwrap_or_default();
        items.push_str(&item(
            class,
            icon,
            &format!("{}. {}", step.index, html_escape(&step.description)),
            &screenshot,
            step.generated_code.as_deref(),
            step.error.as_deref(),
        ));
    }

    let flow_error = flow
        .error
        .as_deref()
        .map(|e| format!(r#"<div class="items"><div class="error-message">{}</div></div>"#, html_escape(e)))
        .unwrap_or_default();

    format!(
        r#"
        <div class="card {status_class}">
            <div class="card-header">
                <h3>{name} <span class="badge">{status_text}</span></h3>
                <span class="item-meta">{duration}</span>
            </div>
            <div class="card-sub">{description}</div>
            {flow_error}
            <div class="items">{items}</div>
        </div>"#,
        name = html_escape(&flow.name),
        duration = format_duration(flow.duration_ms),
        description = html_escape(&flow.description),
    )
}

fn item(
    class: &str,
    icon: &str,
    title_html: &str,
    meta_html: &str,
    code: Option<&str>,
    error: Option<&str>,
) -> String {
    let code_html = code
        .map(|c| format!("<details><summary>Generated check</summary><pre>{}</pre></details>", html_escape(c)))
        .unwrap_or_default();
    let error_html = error
        .map(|e| format!(r#"<div class="error-message">{}</div>"#, html_escape(e)))
        .unwrap_or_default();

    format!(
        r#"
                <div class="item {class}">
                    <div class="item-icon">{icon}</div>
                    <div class="item-content">
                        <div>{title_html}</div>
                        <div class="item-meta">{meta_html}</div>
                        {code_html}
                        {error_html}
                    </div>
                </div>"#
    )
}

fn or_empty(html: String, placeholder: &str) -> String {
    if html.is_empty() {
        format!(r#"<div class="card-sub" style="padding: 0;">{}</div>"#, placeholder)
    } else {
        html
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60000;
        let seconds = (ms % 60000) as f64 / 1000.0;
        format!("{}m {:.0}s", minutes, seconds)
    }
}
