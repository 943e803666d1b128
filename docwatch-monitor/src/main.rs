//! docwatch - live view of documentation analysis jobs
//!
//! Talks to the job service REST API and, for a running task, its WebSocket
//! push channel. Logs go to stderr; task state goes to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docwatch_common::api::{AnalyzeRequest, TaskStatus};
use docwatch_common::config::{resolve_config, ConfigOverrides};
use docwatch_monitor::{MonitorConfig, TaskMonitor};
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

mod render;

/// Command-line arguments for docwatch
#[derive(Parser, Debug)]
#[command(name = "docwatch")]
#[command(about = "Monitor documentation analysis jobs")]
#[command(version)]
struct Args {
    /// Config file (default: <config dir>/docwatch/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Job service REST root, e.g. http://127.0.0.1:8000/api
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Polling interval in milliseconds
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List known tasks
    List,
    /// Show one task and its file tree
    Show { id: String },
    /// Follow a task until it finishes
    Watch { id: String },
    /// Scan a directory and print its tree
    Scan { path: String },
    /// Start an analysis
    Analyze {
        path: String,
        /// Output directory for generated docs
        #[arg(long)]
        docs_path: Option<String>,
        /// Start over instead of resuming from the checkpoint
        #[arg(long)]
        no_resume: bool,
        /// Follow the new task
        #[arg(long)]
        watch: bool,
    },
    /// Request cancellation of a running task
    Cancel {
        id: String,
        /// Follow the task until the runner confirms
        #[arg(long)]
        watch: bool,
    },
    /// Check that the job service is up
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        config_path: args.config.clone(),
        base_url: args.base_url.clone(),
        poll_interval_ms: args.poll_interval_ms,
    };
    let toml_config = resolve_config(&overrides).context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("docwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = MonitorConfig::from(&toml_config);
    let monitor = TaskMonitor::connect(config).context("Failed to configure job service client")?;

    let result = run(&monitor, args.command).await;
    monitor.shutdown().await;
    result
}

async fn run(monitor: &TaskMonitor, command: Command) -> Result<()> {
    match command {
        Command::List => {
            let tasks = monitor.refresh_list().await.context("Failed to list tasks")?;
            println!("{}", render::task_table(&tasks));
        }
        Command::Show { id } => {
            let task = monitor.focus(&id).await.with_context(|| format!("Failed to load task {id}"))?;
            println!("{}", render::task_detail(&task));
            if let Some(tree) = monitor.registry().snapshot().focused.and_then(|f| f.tree) {
                println!();
                println!("{}", render::tree(&tree));
            }
        }
        Command::Watch { id } => watch(monitor, &id).await?,
        Command::Scan { path } => {
            let (tree, stats) = monitor
                .scan_directory(&path)
                .await
                .with_context(|| format!("Failed to scan {path}"))?;
            println!("{}", render::tree(&tree));
            println!();
            println!(
                "{} files, {} directories, max depth {}",
                stats.total_files, stats.total_dirs, stats.max_depth
            );
        }
        Command::Analyze {
            path,
            docs_path,
            no_resume,
            watch: follow,
        } => {
            let mut request = AnalyzeRequest::new(path);
            request.docs_path = docs_path;
            request.resume = !no_resume;
            let response = monitor
                .start_analysis(&request)
                .await
                .context("Failed to start analysis")?;
            println!("{} {}", response.task_id, response.message);
            if follow {
                watch(monitor, &response.task_id).await?;
            }
        }
        Command::Cancel { id, watch: follow } => {
            let message = monitor
                .cancel(&id)
                .await
                .with_context(|| format!("Failed to cancel task {id}"))?;
            println!("{message}");
            if follow {
                watch(monitor, &id).await?;
            }
        }
        Command::Health => {
            let health = monitor.health().await.context("Job service unreachable")?;
            println!("{}", health.status);
        }
    }
    Ok(())
}

/// Print a status line on every change until the task is terminal or Ctrl+C
async fn watch(monitor: &TaskMonitor, id: &str) -> Result<()> {
    let mut rx = monitor.subscribe();
    monitor
        .focus(id)
        .await
        .with_context(|| format!("Failed to load task {id}"))?;

    // Pending tasks have no subscription; re-load until the runner starts them
    let mut pending_check = tokio::time::interval(monitor.config().poll_interval);
    pending_check.tick().await;

    let mut last_line = String::new();
    loop {
        let (line, status) = {
            let state = rx.borrow_and_update();
            match state.focused.as_ref() {
                Some(focused) => (render::focus_line(focused), Some(focused.task.status)),
                None => (String::new(), None),
            }
        };
        if !line.is_empty() && line != last_line {
            println!("{line}");
            last_line = line;
        }

        match status {
            Some(status) if status.is_terminal() => break,
            None => break,
            _ => {}
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = pending_check.tick(), if status == Some(TaskStatus::Pending) => {
                if let Err(e) = monitor.reload().await {
                    warn!(task_id = %id, error = %e, "Reload failed");
                }
            }
            _ = signal::ctrl_c() => {
                info!("Interrupted");
                monitor.unfocus().await;
                return Ok(());
            }
        }
    }

    if let Some(focused) = monitor.registry().snapshot().focused {
        println!("{}", render::task_detail(&focused.task));
    }
    monitor.unfocus().await;
    Ok(())
}
