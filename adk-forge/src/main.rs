//! Forge - markdown tasks in, project files out.
//!
//! ## Usage
//!
//! ```bash
//! # Run every task in tasks.md against the configured provider
//! forge run
//!
//! # Use another task file and provider
//! FORGE_PROVIDER=openai forge run --tasks plan.md --overwrite
//!
//! # Commit each task's files under the project root
//! forge run --git
//!
//! # List tasks, check the endpoint, show the effective configuration
//! forge tasks
//! forge probe
//! forge config
//! ```
//!
//! Exit codes: 0 on success, 1 on configuration or task file errors, 2 when a
//! task failed, the run was cancelled or the endpoint is unreachable.

use adk_forge::{
    build_client, DebugLevel, DispatchConfig, ForgeConfig, ForgeError, ForgeOutput, Task,
    TaskDispatcher, TaskParser, TelemetryConfig,
};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const EXIT_CONFIG: i32 = 1;
const EXIT_FAILED: i32 = 2;

/// Forge - run markdown tasks through an LLM and write the results
#[derive(Parser, Debug)]
#[command(name = "forge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output verbosity level
    #[arg(short = 'd', long, value_enum, global = true)]
    debug: Option<CliDebugLevel>,

    /// Project output directory (overrides FORGE_PROJECT_PATH)
    #[arg(short = 'p', long, global = true)]
    project_path: Option<String>,

    /// Configuration file (defaults to ./forge.yaml when present)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,
}

/// CLI debug level (maps to DebugLevel)
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliDebugLevel {
    /// Only errors and the final line
    Minimal,
    /// Task progress (default)
    Normal,
    /// Per-step results
    Verbose,
    /// Everything
    Debug,
}

impl From<CliDebugLevel> for DebugLevel {
    fn from(cli: CliDebugLevel) -> Self {
        match cli {
            CliDebugLevel::Minimal => DebugLevel::Minimal,
            CliDebugLevel::Normal => DebugLevel::Normal,
            CliDebugLevel::Verbose => DebugLevel::Verbose,
            CliDebugLevel::Debug => DebugLevel::Debug,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute tasks and write the generated files
    Run {
        /// Task file (overrides FORGE_TASKS_PATH)
        #[arg(short, long)]
        tasks: Option<String>,
        /// Only run tasks whose id or title matches (repeatable)
        #[arg(long = "only", value_name = "TASK")]
        only: Vec<String>,
        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,
        /// Write the run report as JSON to this path
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
        /// Ask the model for a README.md after the last task
        #[arg(long)]
        readme: bool,
        /// Commit each task's written files to git (overrides FORGE_GIT_INTEGRATION)
        #[arg(long)]
        git: bool,
    },
    /// List the tasks found in the task file
    Tasks {
        /// Task file (overrides FORGE_TASKS_PATH)
        #[arg(short, long)]
        tasks: Option<String>,
    },
    /// Check that the LLM endpoint is reachable and has a model loaded
    Probe,
    /// Show and validate the effective configuration
    Config,
}

/// Initialize tracing. `RUST_LOG` wins over the debug level.
fn init_telemetry(config: &TelemetryConfig, debug_level: DebugLevel) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Normal output is the colored progress; keep tracing quiet under it.
    let log_level = match debug_level {
        DebugLevel::Minimal => "error",
        DebugLevel::Normal => "warn",
        DebugLevel::Verbose => config.log_level.as_str(),
        DebugLevel::Debug => "debug",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(debug_level.is_debug()).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn print_config(config: &ForgeConfig) {
    let llm = &config.llm;
    println!("{}", "Configuration:".yellow().bold());
    println!("  Provider:      {}", llm.provider.to_string().cyan());
    println!("  Model:         {}", llm.resolved_model());
    println!(
        "  API base:      {}",
        llm.resolved_api_base().unwrap_or_else(|| "(not set)".to_string())
    );
    let key_state = if llm.api_key().is_some() {
        "set".green()
    } else if llm.provider.requires_api_key() {
        "missing".red()
    } else {
        "not needed".normal()
    };
    println!("  API key:       {} ({})", llm.resolved_api_key_env(), key_state);
    println!("  Request style: {}", llm.request_style);
    println!("  Temperature:   {}", llm.temperature);
    println!("  Max tokens:    {}", llm.max_tokens);
    println!("  Timeout:       {}s", llm.timeout_seconds);
    println!("  Project path:  {}", config.project_path);
    println!("  Tasks path:    {}", config.tasks_path);
    println!("  Project type:  {}", config.project_type);
    println!("  Overwrite:     {}", config.overwrite);
    println!("  Git commits:   {}", config.git_integration);
    println!("  Debug level:   {}", config.debug_level.to_string().cyan());
    println!();
}

fn config_error(error: &dyn std::fmt::Display) -> ! {
    eprintln!("{}: {}", "Configuration Error".red().bold(), error);
    eprintln!();
    eprintln!("Settings come from {} or FORGE_* variables, for example:", "forge.yaml".cyan());
    eprintln!("  FORGE_PROVIDER=openai");
    eprintln!("  FORGE_MODEL=gpt-4");
    eprintln!("  OPENAI_API_KEY=your-api-key");
    std::process::exit(EXIT_CONFIG);
}

fn load_tasks(path: &str, output: &ForgeOutput) -> Vec<Task> {
    match TaskParser::new().load(Path::new(path)) {
        Ok(tasks) => tasks,
        Err(e) => {
            output.error(&e.to_string());
            std::process::exit(EXIT_CONFIG);
        }
    }
}

fn select_tasks(tasks: Vec<Task>, only: &[String], output: &ForgeOutput) -> Vec<Task> {
    if only.is_empty() {
        return tasks;
    }
    let is_match = |task: &Task, wanted: &str| {
        task.title.eq_ignore_ascii_case(wanted)
            || task.id.as_deref().is_some_and(|id| id.eq_ignore_ascii_case(wanted))
    };

    let missing = only
        .iter()
        .find(|wanted| !tasks.iter().any(|t| is_match(t, wanted.as_str())));
    if let Some(missing) = missing {
        output.error(&format!("No task matches '{}'", missing));
        std::process::exit(EXIT_CONFIG);
    }

    tasks
        .into_iter()
        .filter(|task| only.iter().any(|wanted| is_match(task, wanted.as_str())))
        .collect()
}

async fn run_tasks(
    config: &ForgeConfig,
    tasks: Vec<Task>,
    report_path: Option<&Path>,
    output: ForgeOutput,
) -> Result<i32, ForgeError> {
    let client = build_client(&config.llm)?;
    if !client.probe().await {
        output.warn(&format!(
            "{} endpoint did not answer the probe; continuing anyway",
            config.llm.provider
        ));
    }

    let dispatcher = TaskDispatcher::builder()
        .client(client)
        .config(DispatchConfig::from_forge_config(config))
        .observer(Arc::new(output.clone()))
        .build()?;

    let token = dispatcher.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling after the current step...".yellow());
            token.cancel();
        }
    });

    output.phase(&format!("Running {} tasks", tasks.len()));
    let report = dispatcher.run(&tasks).await;
    output.summary(&report);

    // A report that cannot be written does not change the run's outcome
    if let Some(path) = report_path {
        match report.write_json(path) {
            Ok(()) => output.status(&format!("Report written to {}", path.display())),
            Err(e) => output.warn(&format!("Could not write report: {e}")),
        }
    }

    Ok(if report.all_succeeded() && !report.cancelled { 0 } else { EXIT_FAILED })
}

#[tokio::main]
async fn main() {
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded environment from: {}", path.display());
    }

    let cli = Cli::parse();

    let mut config = match ForgeConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => config_error(&e),
    };

    if let Some(debug_level) = cli.debug {
        config.debug_level = debug_level.into();
    }
    if let Some(ref path) = cli.project_path {
        config.project_path = path.clone();
    }
    if let Commands::Run { tasks, overwrite, readme, git, .. } = &cli.command {
        if let Some(tasks) = tasks {
            config.tasks_path = tasks.clone();
        }
        config.overwrite |= *overwrite;
        config.generate_readme |= *readme;
        config.git_integration |= *git;
    }
    if let Commands::Tasks { tasks: Some(tasks) } = &cli.command {
        config.tasks_path = tasks.clone();
    }
    if let Err(e) = config.validate() {
        config_error(&e);
    }

    init_telemetry(&config.telemetry, config.debug_level);
    let output = ForgeOutput::new(config.debug_level);

    let code = match cli.command {
        Commands::Run { only, report, .. } => {
            output.banner();
            let tasks = select_tasks(load_tasks(&config.tasks_path, &output), &only, &output);
            if tasks.is_empty() {
                output.warn(&format!("No tasks to run in {}", config.tasks_path));
                0
            } else {
                info!(tasks = tasks.len(), path = %config.tasks_path, "Loaded tasks");
                match run_tasks(&config, tasks, report.as_deref(), output.clone()).await {
                    Ok(code) => code,
                    Err(e) => {
                        output.error(&e.to_string());
                        EXIT_CONFIG
                    }
                }
            }
        }

        Commands::Tasks { .. } => {
            let tasks = load_tasks(&config.tasks_path, &output);
            println!("{} {}", "Tasks in".yellow().bold(), config.tasks_path);
            for task in &tasks {
                println!("  {} {}", "→".bright_blue(), task);
                for step in &task.steps {
                    println!("    {} {}", "─".bright_black(), step);
                }
            }
            if tasks.is_empty() {
                println!("  (none)");
            }
            0
        }

        Commands::Probe => match build_client(&config.llm) {
            Ok(client) => {
                if client.probe().await {
                    output.success(&format!(
                        "{} is reachable ({})",
                        config.llm.provider,
                        client.model()
                    ));
                    0
                } else {
                    output.error(&format!("{} is not reachable", config.llm.provider));
                    EXIT_FAILED
                }
            }
            Err(e) => {
                output.error(&e.to_string());
                EXIT_CONFIG
            }
        },

        Commands::Config => {
            print_config(&config);
            println!("{}", "Configuration is valid!".green());
            0
        }
    };

    std::process::exit(code);
}
