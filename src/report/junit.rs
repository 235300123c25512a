use super::types::RunReport;
use crate::runner::state::{FlowResult, PageResult};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

/// One `<testcase>` before serialization.
struct Case<'a> {
    name: String,
    classname: &'a str,
    time_ms: u64,
    outcome: Outcome<'a>,
    system_out: Option<&'a str>,
}

enum Outcome<'a> {
    Passed,
    Failed(&'a str),
    Skipped(&'a str),
}

/// Generate JUnit XML: a `pages` suite with one case per expectation and a
/// `flows` suite with one case per step.
pub fn generate_junit_xml(report: &RunReport) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let summary = &report.summary;
    let tests = summary.total_expectations + summary.total_steps;
    let failures = summary.failed_expectations + summary.failed_steps;

    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "ensure-ui"));
    suites_start.push_attribute(("tests", tests.to_string().as_str()));
    suites_start.push_attribute(("failures", failures.to_string().as_str()));
    suites_start.push_attribute(("skipped", summary.skipped_steps.to_string().as_str()));
    suites_start.push_attribute(("time", seconds(summary.duration_ms).as_str()));
    writer.write_event(Event::Start(suites_start))?;

    let expectations: Vec<Case<'_>> = report.pages.iter().flat_map(page_cases).collect();
    let pages_ms: u64 = report.pages.iter().map(|p| p.duration_ms).sum();
    write_suite(&mut writer, "pages", report, pages_ms, &expectations)?;

    let steps: Vec<Case<'_>> = report.flows.iter().flat_map(flow_cases).collect();
    let flows_ms: u64 = report.flows.iter().map(|f| f.duration_ms).sum();
    write_suite(&mut writer, "flows", report, flows_ms, &steps)?;

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(xml)
}

fn page_cases(page: &PageResult) -> Vec<Case<'_>> {
    page.expectations
        .iter()
        .map(|exp| Case {
            name: exp.text.clone(),
            classname: &page.file_path,
            time_ms: 0,
            outcome: if exp.passed {
                Outcome::Passed
            } else {
                Outcome::Failed(exp.error.as_deref().unwrap_or("Unknown error"))
            },
            system_out: exp.generated_code.as_deref(),
        })
        .collect()
}

fn flow_cases(flow: &FlowResult) -> Vec<Case<'_>> {
    let classname = flow.name.as_str();
    flow.steps
        .iter()
        .map(|step| Case {
            name: format!("{}. {}", step.index, step.description),
            classname,
            time_ms: 0,
            outcome: match (step.attempted, step.passed) {
                (false, _) => Outcome::Skipped(match &flow.error {
                    Some(err) => err.as_str(),
                    None => "not attempted: an earlier step failed",
                }),
                (true, true) => Outcome::Passed,
                (true, false) => Outcome::Failed(step.error.as_deref().unwrap_or("Unknown error")),
            },
            system_out: step.generated_code.as_deref(),
        })
        .collect()
}

fn write_suite<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    report: &RunReport,
    duration_ms: u64,
    cases: &[Case<'_>],
) -> Result<()> {
    let failures = cases
        .iter()
        .filter(|c| matches!(c.outcome, Outcome::Failed(_)))
        .count();
    let skipped = cases
        .iter()
        .filter(|c| matches!(c.outcome, Outcome::Skipped(_)))
        .count();

    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", name));
    suite_start.push_attribute(("tests", cases.len().to_string().as_str()));
    suite_start.push_attribute(("failures", failures.to_string().as_str()));
    suite_start.push_attribute(("skipped", skipped.to_string().as_str()));
    suite_start.push_attribute(("id", report.session_id.as_str()));
    suite_start.push_attribute(("time", seconds(duration_ms).as_str()));
    suite_start.push_attribute(("timestamp", report.generated_at.as_str()));
    writer.write_event(Event::Start(suite_start))?;

    for case in cases {
        write_test_case(writer, case)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    Ok(())
}

fn write_test_case<W: std::io::Write>(writer: &mut Writer<W>, case: &Case<'_>) -> Result<()> {
    let mut case_start = BytesStart::new("testcase");
    let classname = case.classname.replace('/', ".");
    case_start.push_attribute(("name", case.name.as_str()));
    case_start.push_attribute(("classname", classname.as_str()));
    case_start.push_attribute(("time", seconds(case.time_ms).as_str()));
    writer.write_event(Event::Start(case_start))?;

    match case.outcome {
        Outcome::Passed => {}
        Outcome::Failed(message) => {
            let mut fail_start = BytesStart::new("failure");
            fail_start.push_attribute(("message", message));
            fail_start.push_attribute(("type", "AssertionError"));
            writer.write_event(Event::Start(fail_start))?;
            writer.write_event(Event::Text(BytesText::new(message)))?;
            writer.write_event(Event::End(BytesEnd::new("failure")))?;
        }
        Outcome::Skipped(message) => {
            let mut skip = BytesStart::new("skipped");
            skip.push_attribute(("message", message));
            writer.write_event(Event::Empty(skip))?;
        }
    }

    if let Some(code) = case.system_out {
        writer.write_event(Event::Start(BytesStart::new("system-out")))?;
        writer.write_event(Event::Text(BytesText::new(code)))?;
        writer.write_event(Event::End(BytesEnd::new("system-out")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

fn seconds(ms: u64) -> String {
    (ms as f64 / 1000.0).to_string()
}

/// Write `junit.xml` into `output_dir`.
pub fn write_report(report: &RunReport, output_dir: &Path) -> Result<()> {
    let xml = generate_junit_xml(report)?;
    let path = output_dir.join("junit.xml");
    std::fs::write(&path, xml)?;
    log::info!("Generated JUnit report: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Expectation, FlowStep};
    use crate::runner::state::{BasicChecks, FlowSession, FlowStatus};
    use std::collections::HashMap;

    fn sample_report() -> RunReport {
        let mut shown = Expectation::new("shows About Us", 1, "shows About Us");
        shown.pass();
        let mut pricing = Expectation::new("lists <3> plans", 2, "lists <3> plans");
        pricing.fail("Timeout after 100ms waiting for: text 'Pricing'");

        let page = PageResult {
            file_path: "app/about/page.tsx".to_string(),
            route: "/about".to_string(),
            url: "http://localhost:3000/about".to_string(),
            basic_checks: BasicChecks {
                page_loaded: true,
                status: Some(200),
                title: Some("About".to_string()),
            },
            expectations: vec![shown, pricing],
            url_params: HashMap::new(),
            error: None,
            duration_ms: 1500,
        };

        let mut s1 = FlowStep::new(1, "Visit /login", Some("/login".to_string()));
        s1.pass();
        let mut s2 = FlowStep::new(2, "Sign in", None);
        s2.fail("Element not found");
        let s3 = FlowStep::new(3, "See dashboard", None);

        let flow = FlowResult {
            name: "Login Flow".to_string(),
            description: String::new(),
            source_path: Some("flows/login.md".to_string()),
            status: FlowStatus::Failed { step_index: 1 },
            steps: vec![s1, s2, s3],
            session: FlowSession::default(),
            error: None,
            duration_ms: 2000,
        };

        RunReport::new("test-session", "http://localhost:3000", vec![page], vec![flow], 3500)
    }

    #[test]
    fn test_generate_junit_xml() {
        let xml = generate_junit_xml(&sample_report()).expect("Failed to generate XML");

        assert!(xml.contains(r#"<testsuites name="ensure-ui""#));
        assert!(xml.contains(r#"tests="5""#));
        assert!(xml.contains(r#"failures="2""#));
        assert!(xml.contains(r#"<testsuite name="pages" tests="2" failures="1""#));
        assert!(xml.contains(r#"<testsuite name="flows" tests="3" failures="1" skipped="1""#));
        assert!(xml.contains(r#"<testcase name="shows About Us" classname="app.about.page.tsx""#));
        assert!(xml.contains("lists &lt;3&gt; plans"));
        assert!(xml.contains(r#"message="Element not found""#));
        assert!(xml.contains("<skipped message=\"not attempted: an earlier step failed\"/>"));
    }
}
