//! Collaborator traits: the seams between the scheduler core and
//! persistence, crawling, and system maintenance jobs.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::types::{
    CrawlTask, HotItem, LogPage, LogQuery, LogType, Platform, TaskConfig, TaskLogEntry, Work,
};

/// CRUD persistence for task definitions.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list_enabled_tasks(&self) -> Result<Vec<CrawlTask>>;

    async fn list_tasks(&self) -> Result<Vec<CrawlTask>>;

    async fn get_task(&self, id: &str) -> Result<Option<CrawlTask>>;

    async fn create_task(&self, task: &CrawlTask) -> Result<()>;

    /// Overwrite the admin-editable fields of an existing task.
    async fn update_task(&self, task: &CrawlTask) -> Result<()>;

    /// Returns false when nothing was deleted.
    async fn delete_task(&self, id: &str) -> Result<bool>;

    /// Flip the enabled flag. Returns the updated task, if it exists.
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<Option<CrawlTask>>;

    /// Written only by the execution engine while it holds the task's run-lock.
    async fn update_run_metadata(
        &self,
        id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Dedup target and sink for discovered works.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All content ids already stored for a platform.
    async fn existing_keys(&self, platform: Platform) -> Result<HashSet<String>>;

    /// Insert unless `(platform, content_id)` already exists. Returns whether a row was written.
    async fn insert_if_absent(&self, work: &Work, task_id: &str) -> Result<bool>;
}

/// Append-only execution history.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Persist a freshly opened (`running`) entry.
    async fn open(&self, entry: &TaskLogEntry) -> Result<()>;

    /// Persist the final state of an entry previously opened.
    async fn finish(&self, entry: &TaskLogEntry) -> Result<()>;

    async fn list(&self, query: &LogQuery) -> Result<LogPage>;
}

/// Daily trending-list snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Upsert the snapshot for `(platform, capture_date)`.
    async fn save_snapshot(
        &self,
        platform: Platform,
        capture_date: NaiveDate,
        captured_at: DateTime<Utc>,
        items: &[HotItem],
    ) -> Result<()>;

    async fn load_snapshot(
        &self,
        platform: Platform,
        capture_date: NaiveDate,
    ) -> Result<Option<Vec<HotItem>>>;
}

/// Platform-specific "fetch an author's current works".
///
/// Implementations must not hang or panic on upstream failure: return an
/// `Err` to fail the run, or a (possibly empty) result.
#[async_trait]
pub trait CrawlAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch_works(&self, target: &str, config: &TaskConfig) -> Result<Vec<Work>>;

    /// Turn user input (author id or profile URL) into the stored target identifier.
    fn normalize_target(&self, input: &str) -> Result<String>;
}

/// Platform-specific trending list.
#[async_trait]
pub trait HotsearchSource: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch_hot(&self, limit: usize) -> Result<Vec<HotItem>>;
}

/// Outcome of a system job run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    pub crawled_count: u32,
    pub detail: Option<String>,
}

/// Fixed-schedule maintenance job (backup, hotsearch) not tied to a task row.
#[async_trait]
pub trait SystemJob: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> LogType;

    /// 5-field cron expression.
    fn cron(&self) -> &str;

    async fn run(&self) -> Result<JobReport>;
}
