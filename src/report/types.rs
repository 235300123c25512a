use crate::runner::state::{FlowResult, PageResult, RunSummary};
use serde::{Deserialize, Serialize};

/// Everything one run produced, as written to `results.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub session_id: String,
    /// RFC 3339 local time
    pub generated_at: String,
    pub base_url: String,
    pub pages: Vec<PageResult>,
    pub flows: Vec<FlowResult>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(
        session_id: &str,
        base_url: &str,
        pages: Vec<PageResult>,
        flows: Vec<FlowResult>,
        duration_ms: u64,
    ) -> Self {
        let summary = RunSummary::from_results(&pages, &flows, duration_ms);
        Self {
            session_id: session_id.to_string(),
            generated_at: chrono::Local::now().to_rfc3339(),
            base_url: base_url.to_string(),
            pages,
            flows,
            summary,
        }
    }

    pub fn passed(&self) -> bool {
        self.summary.all_passed()
    }
}
