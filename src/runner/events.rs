use super::state::{FlowStatus, RunSummary};
use tokio::sync::broadcast;

/// Run events for real-time progress output
#[derive(Debug, Clone)]
pub enum TestEvent {
    // Run events
    RunStarted {
        session_id: String,
        page_count: usize,
        flow_count: usize,
    },
    RunFinished {
        summary: RunSummary,
    },

    // Page events
    PageStarted {
        file_path: String,
        url: String,
        expectation_count: usize,
    },
    PageFinished {
        file_path: String,
        passed: usize,
        total: usize,
        error: Option<String>,
        duration_ms: u64,
    },

    // Expectation events
    ExpectationStarted {
        index: usize,
        text: String,
    },
    ExpectationPassed {
        index: usize,
        duration_ms: u64,
    },
    ExpectationFailed {
        index: usize,
        error: String,
        duration_ms: u64,
    },

    // Flow events
    FlowStarted {
        flow_name: String,
        step_count: usize,
    },
    FlowFinished {
        flow_name: String,
        status: FlowStatus,
        duration_ms: u64,
    },

    // Step events
    StepStarted {
        index: usize,
        description: String,
    },
    StepPassed {
        index: usize,
        duration_ms: u64,
    },
    StepFailed {
        index: usize,
        error: String,
        duration_ms: u64,
    },
    StepSkipped {
        index: usize,
        reason: String,
    },

    // Log event for coordinated output
    Log {
        message: String,
    },
}

/// Event emitter for broadcasting run events
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<TestEvent>) {
        let (sender, receiver) = broadcast::channel(256);
        (Self { sender }, receiver)
    }

    /// Fire and forget; having no listener is not an error.
    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(TestEvent::Log {
            message: message.into(),
        });
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }
}

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        // Hidden target when piped so no escape codes leak into logs
        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let mut spinner: Option<ProgressBar> = None;
        let mut current_text = String::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                TestEvent::RunStarted {
                    session_id,
                    page_count,
                    flow_count,
                } => {
                    println!(
                        "\n{} Run {} started: {} page(s), {} flow(s)",
                        "▶".green().bold(),
                        session_id.cyan(),
                        page_count,
                        flow_count
                    );
                }

                TestEvent::RunFinished { summary } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("\n{} Run finished", "■".blue().bold());
                    println!(
                        "  Pages: {}/{} passed, expectations: {} passed, {} failed",
                        summary.passed_pages,
                        summary.total_pages,
                        summary.passed_expectations.to_string().green(),
                        summary.failed_expectations.to_string().red()
                    );
                    println!(
                        "  Flows: {}/{} passed, steps: {} passed, {} failed, {} skipped",
                        summary.passed_flows,
                        summary.total_flows,
                        summary.passed_steps.to_string().green(),
                        summary.failed_steps.to_string().red(),
                        summary.skipped_steps.to_string().yellow()
                    );
                    println!("  Duration: {}ms", summary.duration_ms);
                }

                TestEvent::PageStarted {
                    file_path,
                    url,
                    expectation_count,
                } => {
                    println!(
                        "\n  {} Page: {} -> {} ({} expectations)",
                        "→".blue(),
                        file_path.white().bold(),
                        url.dimmed(),
                        expectation_count
                    );
                }

                TestEvent::PageFinished {
                    file_path,
                    passed,
                    total,
                    error,
                    duration_ms,
                } => {
                    let status = if error.is_none() && passed == total {
                        "PASSED".green().bold()
                    } else {
                        "FAILED".red().bold()
                    };
                    println!(
                        "  {} Page {} [{}] {}/{} ({}ms)",
                        "←".blue(),
                        file_path,
                        status,
                        passed,
                        total,
                        duration_ms
                    );
                    if let Some(err) = error {
                        println!("      {}", err.red());
                    }
                }

                TestEvent::FlowStarted {
                    flow_name,
                    step_count,
                } => {
                    println!(
                        "\n  {} Flow: {} ({} steps)",
                        "→".blue(),
                        flow_name.white().bold(),
                        step_count
                    );
                }

                TestEvent::FlowFinished {
                    flow_name,
                    status,
                    duration_ms,
                } => {
                    let status_str = match status {
                        FlowStatus::Completed => "PASSED".green().bold(),
                        FlowStatus::Failed { step_index } => {
                            format!("FAILED at step {}", step_index + 1).red().bold()
                        }
                        _ => "UNKNOWN".white().bold(),
                    };
                    println!(
                        "  {} Flow {} [{}] ({}ms)",
                        "←".blue(),
                        flow_name,
                        status_str,
                        duration_ms
                    );
                }

                TestEvent::ExpectationStarted { index, text }
                | TestEvent::StepStarted {
                    index,
                    description: text,
                } => {
                    let pb = multi.add(ProgressBar::new_spinner());
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    current_text = format!("[{}] {}... ", index, text.dimmed());
                    pb.set_message(current_text.clone());
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                TestEvent::ExpectationPassed { duration_ms, .. }
                | TestEvent::StepPassed { duration_ms, .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("    {} {}({}ms)", "✓".green(), current_text, duration_ms);
                }

                TestEvent::ExpectationFailed {
                    error, duration_ms, ..
                }
                | TestEvent::StepFailed {
                    error, duration_ms, ..
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("    {} {}({}ms)", "✗".red(), current_text, duration_ms);
                    println!("        {}", error.red());
                }

                TestEvent::StepSkipped { index, reason } => {
                    println!("    {} [{}] {}", "○".yellow(), index, reason.dimmed());
                }

                TestEvent::Log { message } => {
                    multi.println(format!("      {}", message)).ok();
                }
            }
        }
    }
}
