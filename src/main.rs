use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use ensure_ui::driver::{BrowserType, PlaywrightLauncher, WebDriverConfig};
use ensure_ui::llm::{LlmClient, ProviderKind};
use ensure_ui::report::{self, ReportFormat};
use ensure_ui::runner::{self, ConsoleEventListener, EventEmitter};
use ensure_ui::utils::{Config, InteractionPolicy};

#[derive(Parser)]
#[command(name = "ensure-ui")]
#[command(version)]
#[command(about = "Turns `ensureUI` comments and flow documents into browser checks", long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, synthesize and run every expectation and flow
    Run {
        /// Project root to scan for page files
        #[arg(default_value = ".")]
        project: PathBuf,

        /// Deployment under test
        #[arg(long, env = "ENSURE_UI_BASE_URL")]
        base_url: Option<String>,

        /// Output directory for reports and screenshots
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Flow documents directory (defaults to <project>/flows)
        #[arg(long)]
        flows_dir: Option<PathBuf>,

        /// Text generation provider
        #[arg(long, value_enum)]
        provider: Option<ProviderKind>,

        /// Model name for the provider
        #[arg(long)]
        model: Option<String>,

        /// Provider endpoint override
        #[arg(long)]
        llm_base_url: Option<String>,

        /// Navigation and execution timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Show the browser window
        #[arg(long, default_value = "false")]
        headed: bool,

        /// Browser engine
        #[arg(long, value_enum)]
        browser: Option<BrowserType>,

        /// Reject interactions in checks for expectations that never ask for one
        #[arg(long, default_value = "false")]
        restrict_static: bool,

        /// Character budget for the HTML sent to the generator
        #[arg(long)]
        html_budget: Option<usize>,
    },

    /// Re-render a saved results.json
    Report {
        /// Path to results.json
        results: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "html")]
        format: ReportFormat,

        /// Output file path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

struct RunArgs {
    project: PathBuf,
    base_url: Option<String>,
    output: Option<PathBuf>,
    flows_dir: Option<PathBuf>,
    provider: Option<ProviderKind>,
    model: Option<String>,
    llm_base_url: Option<String>,
    timeout: Option<u64>,
    headed: bool,
    browser: Option<BrowserType>,
    restrict_static: bool,
    html_budget: Option<usize>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let code = match cli.command {
        Commands::Run {
            project,
            base_url,
            output,
            flows_dir,
            provider,
            model,
            llm_base_url,
            timeout,
            headed,
            browser,
            restrict_static,
            html_budget,
        } => {
            let args = RunArgs {
                project,
                base_url,
                output,
                flows_dir,
                provider,
                model,
                llm_base_url,
                timeout,
                headed,
                browser,
                restrict_static,
                html_budget,
            };
            match run_command(args).await {
                Ok(true) => 0,
                Ok(false) => 1,
                Err(e) => {
                    eprintln!("{} {:#}", "✗".red().bold(), e);
                    2
                }
            }
        }
        Commands::Report {
            results,
            format,
            output,
        } => match report::generate_report(&results, format, output.as_deref()).await {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{} {:#}", "✗".red().bold(), e);
                2
            }
        },
    };

    std::process::exit(code);
}

fn build_config(args: RunArgs) -> anyhow::Result<Config> {
    let mut config = Config::from_env()?;

    config.project_root = args.project;
    if let Some(url) = args.base_url {
        config.base_url = url;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if args.flows_dir.is_some() {
        config.flows_dir = args.flows_dir;
    }
    if let Some(provider) = args.provider {
        if provider != config.llm.provider {
            config.llm.api_key = None;
        }
        config.llm.provider = provider;
    }
    if args.model.is_some() {
        config.llm.model = args.model;
    }
    if args.llm_base_url.is_some() {
        config.llm.base_url = args.llm_base_url;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_ms = timeout;
    }
    if args.headed {
        config.headless = false;
    }
    if let Some(browser) = args.browser {
        config.browser = browser;
    }
    if args.restrict_static {
        config.interaction_policy = InteractionPolicy::DenyForStatic;
    }
    if let Some(budget) = args.html_budget {
        config.html_budget = budget;
    }

    // the key read from the environment belongs to the provider chosen there
    if config.llm.api_key.is_none() {
        config.llm.api_key = match config.llm.provider {
            ProviderKind::Anthropic => std::env::var("ANTHROPIC_API_KEY").ok(),
            ProviderKind::Openai => std::env::var("OPENAI_API_KEY").ok(),
            ProviderKind::Ollama => None,
        };
    }

    config.validate()?;
    Ok(config)
}

/// `Ok(true)` when every page and flow passed.
async fn run_command(args: RunArgs) -> anyhow::Result<bool> {
    let config = build_config(args)?;
    let generator = LlmClient::from_config(&config.llm)?;
    let launcher = PlaywrightLauncher::new(WebDriverConfig {
        browser_type: config.browser,
        headless: config.headless,
        executable: config.browser_executable.clone(),
        ..Default::default()
    });

    println!(
        "{} Checking {} against {}",
        "▶".green().bold(),
        config.project_root.display(),
        config.base_url.cyan()
    );
    println!("  Provider: {}", generator.provider_name().cyan());
    if config.interaction_policy == InteractionPolicy::DenyForStatic {
        println!("  Static expectations: {}", "no interactions".yellow());
    }
    println!();

    let (events, receiver) = EventEmitter::new();
    let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

    let report = runner::run(&config, &launcher, &generator, events).await;

    // every sender is gone once the run returns, so the listener drains and exits
    let _ = listener.await;

    report::write_all(&report, &config.output_dir)?;

    println!("  Reports: {}", config.output_dir.display());

    if report.passed() {
        println!("{} All checks passed", "✓".green().bold());
    } else {
        println!("{} Some checks failed", "✗".red().bold());
    }
    Ok(report.passed())
}
