use crate::driver::StoredCookie;
use crate::parser::types::{substitute_variables, Expectation, FlowDefinition, FlowStep};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Flow execution state: `Idle -> Running(step) -> Completed | Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FlowStatus {
    Idle,
    Running {
        #[serde(rename = "stepIndex")]
        step_index: usize,
    },
    Completed,
    Failed {
        #[serde(rename = "stepIndex")]
        step_index: usize,
    },
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStatus::Completed | FlowStatus::Failed { .. })
    }

    /// Enter the step at `step_index`. Terminal states do not move.
    pub fn advance(&mut self, step_index: usize) -> bool {
        match self {
            FlowStatus::Idle | FlowStatus::Running { .. } => {
                *self = FlowStatus::Running { step_index };
                true
            }
            _ => false,
        }
    }

    /// Fail at the running step; a no-op outside `Running`.
    pub fn fail(&mut self) {
        if let FlowStatus::Running { step_index } = *self {
            *self = FlowStatus::Failed { step_index };
        }
    }

    /// Complete from `Idle` (empty flow) or `Running`.
    pub fn complete(&mut self) {
        if !self.is_terminal() {
            *self = FlowStatus::Completed;
        }
    }
}

/// Browser state carried between the steps of one flow run.
///
/// Created at flow start from the flow's declared variables and dropped when
/// the flow ends; nothing outlives the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSession {
    pub current_step: usize,
    pub variables: HashMap<String, String>,
    pub cookies: Vec<StoredCookie>,
    pub local_storage: HashMap<String, String>,
}

impl FlowSession {
    pub fn new(flow: &FlowDefinition) -> Self {
        Self {
            current_step: 0,
            variables: flow.variables.clone(),
            cookies: Vec::new(),
            local_storage: HashMap::new(),
        }
    }

    /// Resolve `@name` references against the carried variables.
    pub fn substitute(&self, text: &str) -> String {
        substitute_variables(text, &self.variables)
    }

    /// Record a successful step. A part that could not be read (`None`)
    /// keeps its previous snapshot.
    pub fn snapshot(
        &mut self,
        step_index: usize,
        cookies: Option<Vec<StoredCookie>>,
        local_storage: Option<HashMap<String, String>>,
    ) {
        self.current_step = step_index;
        if let Some(cookies) = cookies {
            self.cookies = cookies;
        }
        if let Some(local_storage) = local_storage {
            self.local_storage = local_storage;
        }
    }
}

/// Load checks made once per page before any expectation runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicChecks {
    pub page_loaded: bool,
    pub status: Option<u16>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub file_path: String,
    pub route: String,
    pub url: String,
    pub basic_checks: BasicChecks,
    pub expectations: Vec<Expectation>,
    #[serde(default)]
    pub url_params: HashMap<String, String>,
    /// Page-level failure (route resolution, launch or navigation)
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl PageResult {
    pub fn passed(&self) -> bool {
        self.error.is_none()
            && self.basic_checks.page_loaded
            && self.expectations.iter().all(|e| e.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.expectations.iter().filter(|e| e.passed).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResult {
    pub name: String,
    pub description: String,
    pub source_path: Option<String>,
    pub status: FlowStatus,
    pub steps: Vec<FlowStep>,
    /// Final carried state
    pub session: FlowSession,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl FlowResult {
    /// Conjunction over attempted steps, false when the flow itself failed.
    pub fn passed(&self) -> bool {
        self.error.is_none()
            && !matches!(self.status, FlowStatus::Failed { .. })
            && self.steps.iter().filter(|s| s.attempted).all(|s| s.passed)
    }

    pub fn skipped_count(&self) -> usize {
        self.steps.iter().filter(|s| !s.attempted).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_pages: usize,
    pub passed_pages: usize,
    pub total_expectations: usize,
    pub passed_expectations: usize,
    pub failed_expectations: usize,
    pub total_flows: usize,
    pub passed_flows: usize,
    pub total_steps: usize,
    pub passed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn from_results(pages: &[PageResult], flows: &[FlowResult], duration_ms: u64) -> Self {
        let mut summary = RunSummary {
            total_pages: pages.len(),
            total_flows: flows.len(),
            duration_ms,
            ..Default::default()
        };

        for page in pages {
            if page.passed() {
                summary.passed_pages += 1;
            }
            for expectation in &page.expectations {
                summary.total_expectations += 1;
                if expectation.passed {
                    summary.passed_expectations += 1;
                } else {
                    summary.failed_expectations += 1;
                }
            }
        }

        for flow in flows {
            if flow.passed() {
                summary.passed_flows += 1;
            }
            for step in &flow.steps {
                summary.total_steps += 1;
                if !step.attempted {
                    summary.skipped_steps += 1;
                } else if step.passed {
                    summary.passed_steps += 1;
                } else {
                    summary.failed_steps += 1;
                }
            }
        }

        summary
    }

    pub fn all_passed(&self) -> bool {
        self.passed_pages == self.total_pages && self.passed_flows == self.total_flows
    }
}
