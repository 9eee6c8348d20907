//! # CrawlWatch: recurring author-crawl scheduler
//!
//! Watches creator profiles on short-video and social platforms, ingests
//! new works on a schedule, and keeps an execution log.
//!
//! Usage:
//!   crawlwatch serve                                   # Run the scheduler until Ctrl-C
//!   crawlwatch task add --name N --platform douyin --target <id|url>
//!   crawlwatch task run <id>                           # Run once, now
//!   crawlwatch logs --task <id>                        # Execution history
//!   crawlwatch backup                                  # Snapshot the database

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crawlwatch_core::config::CrawlWatchConfig;
use crawlwatch_core::types::{CrawlTask, LogQuery, LogStatus, TaskConfig, TaskLogEntry};
use crawlwatch_scheduler::{NewTask, Runtime, TaskUpdate};

#[derive(Parser)]
#[command(
    name = "crawlwatch",
    version,
    about = "🕷️ CrawlWatch — recurring author-crawl scheduler"
)]
struct Cli {
    /// Config file (default: ~/.crawlwatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler and run until Ctrl-C
    Serve,

    /// Manage monitoring tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Show execution logs, newest first
    Logs {
        /// Only logs of this task
        #[arg(long)]
        task: Option<String>,
        /// running | success | failed
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "20")]
        page_size: u32,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Back up the database now (same as the nightly job)
    Backup,
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Create a task
    Add {
        #[arg(long)]
        name: String,
        /// douyin | xiaohongshu | kuaishou | bilibili | weibo
        #[arg(long)]
        platform: String,
        /// Author id or profile URL
        #[arg(long)]
        target: String,
        /// hourly | daily | weekly
        #[arg(long, default_value = "daily")]
        frequency: String,
        /// Create without arming
        #[arg(long)]
        disabled: bool,
        /// Cookie header sent with every request for this task
        #[arg(long)]
        cookies: Option<String>,
    },

    /// List tasks
    List {
        #[arg(long)]
        json: bool,
    },

    /// Edit a task
    Update(UpdateArgs),

    /// Enable or disable a task
    Toggle {
        id: String,
        #[arg(long, conflicts_with = "disable", required_unless_present = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
    },

    /// Delete a task
    Remove { id: String },

    /// Run a task immediately and print the log entry
    Run { id: String },
}

#[derive(Args)]
struct UpdateArgs {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    platform: Option<String>,
    #[arg(long)]
    target: Option<String>,
    #[arg(long)]
    frequency: Option<String>,
    #[arg(long)]
    cookies: Option<String>,
}

fn cookie_config(cookies: Option<String>) -> Option<TaskConfig> {
    cookies.map(|c| {
        let mut config = TaskConfig::new();
        config.insert("cookies".into(), serde_json::Value::String(c));
        config
    })
}

fn load_config(path: Option<&str>) -> Result<CrawlWatchConfig> {
    let config = match path {
        Some(p) => {
            let path = PathBuf::from(shellexpand::tilde(p).to_string());
            CrawlWatchConfig::load_from(&path)
                .with_context(|| format!("loading {}", path.display()))?
                .with_env_overrides()
        }
        None => CrawlWatchConfig::load()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "crawlwatch=debug,crawlwatch_scheduler=debug,crawlwatch_crawlers=debug"
    } else {
        "crawlwatch=info,crawlwatch_scheduler=info,crawlwatch_crawlers=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let rt = Runtime::open(&config)?;

    match cli.command {
        Command::Serve => serve(&rt).await?,
        Command::Task(cmd) => task_command(&rt, cmd).await?,
        Command::Logs {
            task,
            status,
            page,
            page_size,
            json,
        } => {
            let status = status
                .map(|s| s.parse::<LogStatus>())
                .transpose()?;
            let query = LogQuery {
                task_id: task,
                status,
                page,
                page_size,
            };
            let logs = rt.service.list_logs(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&logs)?);
            } else {
                println!(
                    "📜 {} log(s), page {} of {}",
                    logs.total,
                    logs.page,
                    logs.total.div_ceil(logs.page_size.max(1) as u64).max(1)
                );
                for entry in &logs.entries {
                    print_log(entry);
                }
            }
        }
        Command::Backup => {
            let outcome = rt.engine.run_job(rt.backup.as_ref()).await;
            match outcome.entry() {
                Some(entry) => print_log(entry),
                None => println!("⏭️ A backup is already running"),
            }
        }
    }
    Ok(())
}

async fn serve(rt: &Runtime) -> Result<()> {
    let armed = rt.scheduler.start().await?;
    println!("🕷️ CrawlWatch scheduler running ({armed} task(s) armed). Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    rt.scheduler.stop_all();

    let running = rt.engine.running_count();
    if running > 0 {
        tracing::info!("⏳ {running} run(s) still in flight at shutdown");
    }
    Ok(())
}

async fn task_command(rt: &Runtime, cmd: TaskCommand) -> Result<()> {
    let service = &rt.service;
    match cmd {
        TaskCommand::Add {
            name,
            platform,
            target,
            frequency,
            disabled,
            cookies,
        } => {
            let mut input = NewTask::new(&name, &platform, &target).frequency(&frequency);
            input.enabled = !disabled;
            if let Some(config) = cookie_config(cookies) {
                input.config = config;
            }
            let task = service.create_task(input).await?;
            println!("✅ Task created: {}", task.id);
            print_task(&task);
        }
        TaskCommand::List { json } => {
            let tasks = service.list_tasks().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No tasks yet. Add one with `crawlwatch task add`.");
            } else {
                for task in &tasks {
                    print_task(task);
                }
            }
        }
        TaskCommand::Update(args) => {
            let update = TaskUpdate {
                name: args.name,
                platform: args.platform,
                target: args.target,
                frequency: args.frequency,
                enabled: None,
                config: cookie_config(args.cookies),
            };
            let task = service.update_task(&args.id, update).await?;
            println!("✏️ Task updated");
            print_task(&task);
        }
        TaskCommand::Toggle { id, enable, disable } => {
            let task = service.toggle_task(&id, enable && !disable).await?;
            print_task(&task);
        }
        TaskCommand::Remove { id } => {
            service.delete_task(&id).await?;
            println!("🗑️ Task {id} deleted");
        }
        TaskCommand::Run { id } => {
            let entry = service.run_now(&id).await?;
            print_log(&entry);
        }
    }
    Ok(())
}

fn fmt_time(t: Option<chrono::DateTime<chrono::Utc>>) -> String {
    t.map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into())
}

fn print_task(task: &CrawlTask) {
    println!(
        "{} {}  {}  [{} / {}]  {}  last: {}  next: {}",
        if task.enabled { "🟢" } else { "⚪" },
        task.id,
        task.name,
        task.platform,
        task.target_identifier,
        task.frequency,
        fmt_time(task.last_run_at),
        fmt_time(task.next_run_at),
    );
}

fn print_log(entry: &TaskLogEntry) {
    let icon = match entry.status {
        LogStatus::Running => "⏳",
        LogStatus::Success => "✅",
        LogStatus::Failed => "❌",
    };
    println!(
        "{icon} {}  {} ({}, {})  crawled={} new={} known={}  {}ms{}",
        fmt_time(Some(entry.start_time)),
        entry.task_name,
        entry.platform,
        entry.log_type.as_str(),
        entry.crawled_count,
        entry.new_count,
        entry.updated_count,
        entry.execution_time_ms,
        entry
            .error
            .as_deref()
            .map(|e| format!("  error: {e}"))
            .unwrap_or_default(),
    );
}
