pub mod html;
pub mod json;
pub mod junit;
pub mod types;

pub use types::RunReport;

use anyhow::{Context, Result};
use std::path::Path;

/// Output format accepted by the `report` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Json,
    Junit,
    Html,
}

/// Write `results.json`, `junit.xml` and `report.html` into `output_dir`.
pub fn write_all(report: &RunReport, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    json::write_report(report, output_dir)?;
    junit::write_report(report, output_dir)?;
    html::write_report(report, output_dir)?;
    Ok(())
}

/// Re-render a saved `results.json` in another format
pub async fn generate_report(
    results_path: &Path,
    format: ReportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let results = std::fs::read_to_string(results_path)
        .with_context(|| format!("Failed to read results: {}", results_path.display()))?;
    let report: RunReport = serde_json::from_str(&results)
        .with_context(|| format!("Not an ensure-ui results file: {}", results_path.display()))?;

    match format {
        ReportFormat::Json => json::generate(&report, output).await,
        ReportFormat::Html => html::generate(&report, output).await,
        ReportFormat::Junit => {
            let xml = junit::generate_junit_xml(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(path, xml)?;
                    println!("JUnit report saved to: {}", path.display());
                }
                None => println!("{}", xml),
            }
            Ok(())
        }
    }
}
