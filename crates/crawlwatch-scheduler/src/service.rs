//! Admin facade: task CRUD that keeps the armed timers in sync, plus the
//! "run now" and log viewer entry points.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crawlwatch_core::clock::Clock;
use crawlwatch_core::error::{CrawlWatchError, Result};
use crawlwatch_core::traits::{LogSink, TaskStore};
use crawlwatch_core::types::{
    CrawlTask, LogPage, LogQuery, Platform, TaskConfig, TaskLogEntry,
};
use crawlwatch_crawlers::CrawlerRegistry;

use crate::engine::ExecutionEngine;
use crate::frequency::{next_fire_time, parse_frequency};
use crate::registry::SchedulerRegistry;

/// Input for creating a task. Platform and frequency arrive as admin strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub platform: String,
    pub target: String,
    #[serde(default = "default_frequency")]
    pub frequency: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub config: TaskConfig,
}

fn default_frequency() -> String { "daily".into() }
fn bool_true() -> bool { true }

impl NewTask {
    pub fn new(name: &str, platform: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            platform: platform.to_string(),
            target: target.to_string(),
            frequency: default_frequency(),
            enabled: true,
            config: TaskConfig::new(),
        }
    }

    pub fn frequency(mut self, frequency: &str) -> Self {
        self.frequency = frequency.to_string();
        self
    }
}

/// Partial edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub platform: Option<String>,
    pub target: Option<String>,
    pub frequency: Option<String>,
    pub enabled: Option<bool>,
    pub config: Option<TaskConfig>,
}

pub struct TaskService {
    tasks: Arc<dyn TaskStore>,
    logs: Arc<dyn LogSink>,
    crawlers: Arc<CrawlerRegistry>,
    engine: Arc<ExecutionEngine>,
    scheduler: Arc<SchedulerRegistry>,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        logs: Arc<dyn LogSink>,
        crawlers: Arc<CrawlerRegistry>,
        scheduler: Arc<SchedulerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            logs,
            crawlers,
            engine: Arc::clone(scheduler.engine()),
            scheduler,
            clock,
        }
    }

    /// Validate, persist and arm a new task.
    pub async fn create_task(&self, input: NewTask) -> Result<CrawlTask> {
        let name = required("name", &input.name)?;
        let platform: Platform = input.platform.parse()?;
        let frequency = parse_frequency(&input.frequency)?;
        let target = self.crawlers.normalize_target(platform, &input.target)?;

        let mut task = CrawlTask::new(&name, platform, &target, frequency);
        task.created_at = self.clock.now();
        task.enabled = input.enabled;
        task.config = input.config;
        if task.enabled {
            task.next_run_at = Some(next_fire_time(frequency, task.created_at));
        }

        self.tasks.create_task(&task).await?;
        self.scheduler.add_or_update(&task);
        tracing::info!("📅 Task added: '{}' ({} / {}, {})", task.name, platform, target, frequency);
        Ok(task)
    }

    /// Apply an edit. Changing the frequency or re-enabling restarts the
    /// schedule from now.
    pub async fn update_task(&self, id: &str, update: TaskUpdate) -> Result<CrawlTask> {
        let mut task = self.require(id).await?;
        let was_enabled = task.enabled;
        let old_frequency = task.frequency;

        if let Some(name) = update.name {
            task.name = required("name", &name)?;
        }
        if let Some(platform) = update.platform {
            task.platform = platform.parse()?;
        }
        let target = update.target.unwrap_or_else(|| task.target_identifier.clone());
        task.target_identifier = self.crawlers.normalize_target(task.platform, &target)?;
        if let Some(frequency) = update.frequency {
            task.frequency = parse_frequency(&frequency)?;
        }
        if let Some(enabled) = update.enabled {
            task.enabled = enabled;
        }
        if let Some(config) = update.config {
            task.config = config;
        }

        if task.enabled && (!was_enabled || task.frequency != old_frequency) {
            self.reschedule(&mut task);
        }

        self.tasks.update_task(&task).await?;
        self.scheduler.add_or_update(&task);
        tracing::info!("✏️ Task updated: '{}' ({})", task.name, task.id);
        Ok(task)
    }

    /// Enable or disable. Disabling disarms; enabling re-arms from now.
    pub async fn toggle_task(&self, id: &str, enabled: bool) -> Result<CrawlTask> {
        let mut task = self
            .tasks
            .set_enabled(id, enabled)
            .await?
            .ok_or_else(|| CrawlWatchError::TaskNotFound(id.to_string()))?;

        if enabled {
            self.reschedule(&mut task);
            self.tasks.update_task(&task).await?;
        }
        self.scheduler.add_or_update(&task);
        tracing::info!(
            "{} Task '{}' {}",
            if enabled { "▶️" } else { "⏸️" },
            task.name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(task)
    }

    /// Disarm, then delete. An in-flight run still finishes and logs.
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        self.scheduler.remove(id);
        if !self.tasks.delete_task(id).await? {
            return Err(CrawlWatchError::TaskNotFound(id.to_string()));
        }
        tracing::info!("🗑️ Task deleted: {id}");
        Ok(())
    }

    pub async fn get_task(&self, id: &str) -> Result<CrawlTask> {
        self.require(id).await
    }

    pub async fn list_tasks(&self) -> Result<Vec<CrawlTask>> {
        self.tasks.list_tasks().await
    }

    /// Synchronous trigger bypassing the timer.
    pub async fn run_now(&self, id: &str) -> Result<TaskLogEntry> {
        self.engine.run_now(id).await
    }

    pub async fn list_logs(&self, query: &LogQuery) -> Result<LogPage> {
        self.logs.list(query).await
    }

    async fn require(&self, id: &str) -> Result<CrawlTask> {
        self.tasks
            .get_task(id)
            .await?
            .ok_or_else(|| CrawlWatchError::TaskNotFound(id.to_string()))
    }

    fn reschedule(&self, task: &mut CrawlTask) {
        task.next_run_at = Some(next_fire_time(task.frequency, self.clock.now()));
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CrawlWatchError::Config(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}
