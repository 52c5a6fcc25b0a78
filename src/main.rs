//! Binary entry point for synapt.
//!
//! This binary provides the CLI interface for the synapt routing and
//! memory core.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow unnecessary_wraps for consistent command function signatures
#![allow(clippy::unnecessary_wraps)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow option_if_let_else for environment variable fallback chains
#![allow(clippy::option_if_let_else)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use synapt::agent::Agent;
use synapt::cli::{self, OutputFormat};
use synapt::config::CoreConfig;
use synapt::models::{Role, TaskId, TaskPriority, TaskStatus};
use synapt::observability;
use synapt::storage::{DurableStore, HttpFactStore, LocalStore};
use synapt::sync::Synchronizer;
use synapt::tasks::TaskHarness;

/// Synapt - request routing and tiered memory core for conversational agents.
#[derive(Parser)]
#[command(name = "synapt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "SYNAPT_CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Plan the routing for a request without answering it.
    Route {
        /// The request text.
        text: String,

        /// Output format: text or json.
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Store a record outside the turn flow.
    Store {
        /// The content to store.
        content: String,

        /// Record role: user, assistant, system, or knowledge.
        #[arg(short, long, default_value = "knowledge")]
        role: String,
    },

    /// Search stored records by keyword.
    Recall {
        /// The search query.
        query: String,

        /// Maximum number of results.
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output format: text or json.
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the rolling context window.
    Context {
        /// Number of records to show (defaults to the configured window).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format: text or json.
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Push unsynced records to the durable fact log.
    Sync {
        /// Run a cycle even when nothing is pending.
        #[arg(long)]
        force: bool,

        /// Run the periodic worker in the foreground until interrupted.
        #[arg(long)]
        watch: bool,
    },

    /// Show store, synchronizer, and task statistics.
    Status {
        /// Output format: text or json.
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Create, drive, and inspect background tasks.
    Task {
        /// Task subcommand.
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Record feedback that tunes keyword weights.
    Feedback {
        /// The answer or context the feedback refers to.
        context: String,

        /// Mark the feedback as positive.
        #[arg(long, conflicts_with = "negative")]
        positive: bool,

        /// Mark the feedback as negative.
        #[arg(long)]
        negative: bool,
    },

    /// Manage configuration.
    Config {
        /// Show current configuration.
        #[arg(long)]
        show: bool,
    },
}

/// Task subcommands.
#[derive(Subcommand)]
enum TaskAction {
    /// Register a new task.
    Create {
        /// Human-readable description.
        description: String,

        /// Free-form task kind.
        #[arg(short, long, default_value = "manual")]
        kind: String,

        /// Priority: low, normal, or high.
        #[arg(short, long, default_value = "normal")]
        priority: String,
    },

    /// Mark a pending task as running.
    Start {
        /// Task ID.
        id: String,
    },

    /// Mark a running task as completed.
    Complete {
        /// Task ID.
        id: String,

        /// Result payload.
        #[arg(short, long, default_value = "")]
        result: String,
    },

    /// Mark a running task as failed.
    Fail {
        /// Task ID.
        id: String,

        /// Error description.
        #[arg(short, long)]
        error: String,
    },

    /// Cancel a pending or running task.
    Cancel {
        /// Task ID.
        id: String,
    },

    /// Show one task in full, including its log.
    Show {
        /// Task ID.
        id: String,

        /// Output format: text or json.
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List tasks.
    List {
        /// Filter by status: pending, running, completed, failed, or cancelled.
        #[arg(short, long)]
        status: Option<String>,

        /// Output format: text or json.
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    // Load .env before anything reads the environment
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init_from_env(cli.verbose) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, mut config: CoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    // CLI invocations drive sync explicitly through the sync command
    config.sync.auto_start = false;

    match cli.command {
        Commands::Route { text, format } => cmd_route(config, text, parse_format(&format)),

        Commands::Store { content, role } => cmd_store(config, content, role),

        Commands::Recall {
            query,
            limit,
            format,
        } => cmd_recall(config, query, limit, parse_format(&format)),

        Commands::Context { limit, format } => cmd_context(config, limit, parse_format(&format)),

        Commands::Sync { force, watch } => cmd_sync(config, force, watch),

        Commands::Status { format } => cmd_status(config, parse_format(&format)),

        Commands::Task { action } => cmd_task(config, action),

        Commands::Feedback {
            context,
            positive,
            negative,
        } => cmd_feedback(config, context, positive, negative),

        Commands::Config { show } => cmd_config(config, show),
    }
}

/// Loads configuration from the given path (flag or `SYNAPT_CONFIG_PATH`),
/// falling back to the default location.
fn load_config(path: Option<&str>) -> Result<CoreConfig, Box<dyn std::error::Error>> {
    match path {
        Some(config_path) if !config_path.trim().is_empty() => {
            CoreConfig::load_from_file(std::path::Path::new(config_path))
                .map_err(std::convert::Into::into)
        },
        _ => Ok(CoreConfig::load_default()),
    }
}

/// Parses an output format string.
fn parse_format(s: &str) -> OutputFormat {
    s.parse().unwrap_or_default()
}

/// Opens the local record store, creating the data directory if needed.
fn open_local(config: &CoreConfig) -> Result<LocalStore, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.data_dir)?;
    LocalStore::new(config.records_db_path()).map_err(std::convert::Into::into)
}

/// Route command.
fn cmd_route(
    config: CoreConfig,
    text: String,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent = Agent::new(config)?;
    let decision = agent.plan(&text)?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match format {
        OutputFormat::Text => cli::write_decision(&mut handle, &decision)?,
        OutputFormat::Json => cli::write_decision_json(&mut handle, &decision)?,
    }

    Ok(())
}

/// Store command.
fn cmd_store(
    config: CoreConfig,
    content: String,
    role: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(role) = Role::parse(&role) else {
        return Err(format!("unknown role '{role}' (expected user, assistant, system, or knowledge)").into());
    };

    let agent = Agent::new(config)?;
    let id = agent.store_record(role, &content)?;

    println!("Record stored:");
    println!("  ID: {}", id.as_str());
    println!("  Role: {role}");
    if role == Role::Knowledge {
        let unsynced = agent.local_store().unsynced_count()?;
        if unsynced == 0 {
            println!("  Forwarded to the durable store");
        } else {
            println!("  Queued for background sync");
        }
    }

    Ok(())
}

/// Recall command.
fn cmd_recall(
    config: CoreConfig,
    query: String,
    limit: usize,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_local(&config)?;
    let records = store.recall(&query, limit)?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match format {
        OutputFormat::Text => {
            writeln!(handle, "Found {} records:", records.len())?;
            writeln!(handle)?;
            cli::write_records(&mut handle, &records)?;
        },
        OutputFormat::Json => cli::write_records_json(&mut handle, &records)?,
    }

    Ok(())
}

/// Context command.
fn cmd_context(
    config: CoreConfig,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let window = limit.unwrap_or(config.context_window);
    let store = open_local(&config)?;
    let records = store.get_context(window)?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match format {
        OutputFormat::Text => {
            writeln!(handle, "Context window ({} of {} records):", records.len(), window)?;
            writeln!(handle)?;
            cli::write_records(&mut handle, &records)?;
        },
        OutputFormat::Json => cli::write_records_json(&mut handle, &records)?,
    }

    Ok(())
}

/// Sync command.
fn cmd_sync(config: CoreConfig, force: bool, watch: bool) -> Result<(), Box<dyn std::error::Error>> {
    let Some(endpoint) = config.durable.endpoint.clone() else {
        println!("No durable endpoint configured.");
        println!("Set durable.endpoint in config.toml or SYNAPT_DURABLE_ENDPOINT.");
        println!("Records stay queued locally until one is configured.");
        return Ok(());
    };

    let local = Arc::new(open_local(&config)?);
    let durable: Arc<dyn DurableStore> =
        Arc::new(HttpFactStore::new(endpoint, config.durable.api_token.clone()));
    let sync = Synchronizer::new(Arc::clone(&local), durable)
        .with_initial_delay(config.sync.initial_delay())
        .with_interval(config.sync.interval())
        .with_max_backoff(config.sync.max_backoff())
        .with_stop_timeout(config.sync.stop_timeout());

    if watch {
        let (stop_tx, stop_rx) = mpsc::channel();
        ctrlc::set_handler(move || {
            let _ = stop_tx.send(());
        })?;

        sync.start()?;
        println!("Sync worker started (ctrl-c to stop)");

        let stdout = io::stdout();
        let mut handle = stdout.lock();
        cli::run_watch(&mut handle, &sync, Duration::from_secs(1), &stop_rx)?;
        drop(handle);

        sync.stop();
        let stats = sync.stats();
        println!(
            "Sync worker stopped: {} cycles completed, {} records synced",
            stats.cycles_completed, stats.records_synced
        );
        return Ok(());
    }

    let pending = local.unsynced_count()?;
    if pending == 0 && !force {
        println!("Nothing to sync (0 records pending)");
        return Ok(());
    }

    println!("Syncing {pending} pending records...");
    let accepted = sync.force_sync()?;
    println!("Sync completed: {accepted} records accepted");

    Ok(())
}

/// Status command.
fn cmd_status(config: CoreConfig, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let agent = Agent::new(config)?;
    let status = agent.status()?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match format {
        OutputFormat::Text => cli::write_status(&mut handle, &status)?,
        OutputFormat::Json => cli::write_status_json(&mut handle, &status)?,
    }

    Ok(())
}

/// Task command.
fn cmd_task(config: CoreConfig, action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.data_dir)?;
    let tasks = TaskHarness::new(config.tasks_db_path())?;

    match action {
        TaskAction::Create {
            description,
            kind,
            priority,
        } => {
            let Some(priority) = TaskPriority::parse(&priority) else {
                return Err(format!("unknown priority '{priority}' (expected low, normal, or high)").into());
            };
            let task = tasks.create(description, &kind, priority)?;
            println!("Task created:");
            println!("  ID: {}", task.id);
            println!("  Priority: {}", task.priority);
        },

        TaskAction::Start { id } => {
            let task = tasks.start(&TaskId::from(id))?;
            println!("Task {} is now {}", task.id, task.status);
        },

        TaskAction::Complete { id, result } => {
            let task = tasks.complete(&TaskId::from(id), result)?;
            println!("Task {} is now {}", task.id, task.status);
        },

        TaskAction::Fail { id, error } => {
            let task = tasks.fail(&TaskId::from(id), error)?;
            println!("Task {} is now {}", task.id, task.status);
        },

        TaskAction::Cancel { id } => {
            let task = tasks.cancel(&TaskId::from(id))?;
            println!("Task {} is now {}", task.id, task.status);
        },

        TaskAction::Show { id, format } => {
            let id = TaskId::from(id);
            let Some(task) = tasks.get(&id)? else {
                return Err(format!("unknown task: {id}").into());
            };
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            match parse_format(&format) {
                OutputFormat::Text => cli::write_task_detail(&mut handle, &task)?,
                OutputFormat::Json => cli::write_task_json(&mut handle, &task)?,
            }
        },

        TaskAction::List { status, format } => {
            let filter = match status.as_deref() {
                Some(s) => match TaskStatus::parse(s) {
                    Some(status) => Some(status),
                    None => {
                        return Err(format!(
                            "unknown status '{s}' (expected pending, running, completed, failed, or cancelled)"
                        )
                        .into());
                    },
                },
                None => None,
            };
            let listing = tasks.list(filter)?;
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            match parse_format(&format) {
                OutputFormat::Text => cli::write_task_table(&mut handle, &listing)?,
                OutputFormat::Json => cli::write_tasks_json(&mut handle, &listing)?,
            }
        },
    }

    Ok(())
}

/// Feedback command.
fn cmd_feedback(
    config: CoreConfig,
    context: String,
    positive: bool,
    negative: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !positive && !negative {
        return Err("pass --positive or --negative".into());
    }

    let agent = Agent::new(config)?;
    agent.record_feedback(positive, &context)?;

    if positive {
        println!("Positive feedback recorded; boosted keywords:");
        for keyword in synapt::classify::extract_keywords(&context) {
            if let Some(weight) = agent.weight_store().weight_for(&keyword)? {
                println!("  {keyword}: {weight:.2}");
            }
        }
    } else {
        println!("Negative feedback recorded");
    }

    Ok(())
}

/// Config command.
fn cmd_config(config: CoreConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current Configuration");
        println!("=====================");
        println!();
        println!("Data Directory: {}", config.data_dir.display());
        println!("Context Window: {}", config.context_window);
        println!("Recall Limit: {}", config.recall_limit);
        println!();
        println!("LLM Configuration:");
        println!("  Backend: {}", config.llm.backend);
        println!(
            "  Model: {}",
            config.llm.model.as_deref().unwrap_or("(default)")
        );
        println!(
            "  Endpoint: {}",
            config.llm.endpoint.as_deref().unwrap_or("(default)")
        );
        println!();
        println!("Durable Store:");
        println!(
            "  Endpoint: {}",
            config.durable.endpoint.as_deref().unwrap_or("(not configured)")
        );
        println!(
            "  API Token: {}",
            if config.durable.api_token.is_some() {
                "(set)"
            } else {
                "(not set)"
            }
        );
        println!();
        println!("Sync:");
        println!("  Auto-Start: {}", config.sync.auto_start);
        println!("  Initial Delay: {}s", config.sync.initial_delay_secs);
        println!("  Interval: {}s", config.sync.interval_secs);
        println!("  Max Backoff: {}s", config.sync.max_backoff_secs);
        println!();
        println!("Dispatch:");
        println!("  Call Timeout: {}ms", config.dispatch.call_timeout_ms);
        println!();
        println!("Weights:");
        println!("  Boost Amount: {}", config.weights.boost_amount);
        println!("  Decay Rate: {}", config.weights.decay_rate);
    } else {
        println!("Use --show to display configuration");
    }

    Ok(())
}
