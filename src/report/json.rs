use super::types::RunReport;
use anyhow::Result;
use std::path::Path;

pub fn to_json(report: &RunReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Generate JSON report
pub async fn generate(report: &RunReport, output: Option<&Path>) -> Result<()> {
    let json = to_json(report)?;

    if let Some(path) = output {
        std::fs::write(path, json)?;
        println!("JSON report saved to: {}", path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}

/// Write `results.json` into `output_dir`.
pub fn write_report(report: &RunReport, output_dir: &Path) -> Result<()> {
    let path = output_dir.join("results.json");
    std::fs::write(&path, to_json(report)?)?;
    log::info!("Generated JSON report: {}", path.display());
    Ok(())
}
