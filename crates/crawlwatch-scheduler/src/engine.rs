//! Execution Engine: runs one trigger end-to-end.
//!
//! lock → open log → fetch → dedup → persist → bookkeeping → close log → unlock.
//! Every exit path after the lock ends in a closed log entry; the lock is
//! released by [`RunGuard`]'s drop, so panics and early returns release it too.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::Semaphore;

use crawlwatch_core::clock::Clock;
use crawlwatch_core::config::SchedulerConfig;
use crawlwatch_core::error::{CrawlWatchError, Result};
use crawlwatch_core::traits::{ContentStore, JobReport, LogSink, SystemJob, TaskStore};
use crawlwatch_core::types::{ContentKey, CrawlTask, TaskLogEntry, Work};
use crawlwatch_crawlers::CrawlerRegistry;

use crate::dedup;
use crate::frequency::next_fire_time;
use crate::lock::{RunGuard, RunLocks};

/// What happened to one trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The run executed; the closed log entry is attached.
    Completed(TaskLogEntry),
    /// A run for the same key was already in flight. Nothing was written.
    Skipped,
}

impl RunOutcome {
    pub fn entry(&self) -> Option<&TaskLogEntry> {
        match self {
            RunOutcome::Completed(entry) => Some(entry),
            RunOutcome::Skipped => None,
        }
    }
}

/// Counters gathered by the crawl step. Zero on fetch failure.
#[derive(Debug, Default)]
struct CrawlStats {
    crawled: u32,
    inserted: u32,
    known: u32,
    error: Option<String>,
}

impl CrawlStats {
    fn failed(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

pub struct ExecutionEngine {
    tasks: Arc<dyn TaskStore>,
    contents: Arc<dyn ContentStore>,
    logs: Arc<dyn LogSink>,
    crawlers: Arc<CrawlerRegistry>,
    clock: Arc<dyn Clock>,
    locks: RunLocks,
    permits: Option<Arc<Semaphore>>,
    fetch_timeout: Option<Duration>,
}

impl ExecutionEngine {
    /// Engine with no fetch timeout and no global concurrency cap.
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        contents: Arc<dyn ContentStore>,
        logs: Arc<dyn LogSink>,
        crawlers: Arc<CrawlerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            contents,
            logs,
            crawlers,
            clock,
            locks: RunLocks::new(),
            permits: None,
            fetch_timeout: None,
        }
    }

    /// Apply `fetch_timeout_secs` and `max_concurrent_runs` (0 = off for both).
    pub fn with_limits(mut self, config: &SchedulerConfig) -> Self {
        self.fetch_timeout =
            (config.fetch_timeout_secs > 0).then(|| Duration::from_secs(config.fetch_timeout_secs));
        self.permits = (config.max_concurrent_runs > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent_runs)));
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.locks.is_held(key)
    }

    /// Number of triggers currently holding a run-lock.
    pub fn running_count(&self) -> usize {
        self.locks.held_count()
    }

    /// Scheduled trigger. A trigger that finds the task's lock held returns
    /// [`RunOutcome::Skipped`] without touching the log.
    pub async fn run_task(&self, task_id: &str) -> Result<RunOutcome> {
        let Some(guard) = self.locks.try_acquire(task_id) else {
            tracing::debug!("⏭️ Task {task_id} still running, trigger skipped");
            return Ok(RunOutcome::Skipped);
        };

        let task = match self.tasks.get_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return Err(CrawlWatchError::TaskNotFound(task_id.to_string())),
            Err(e) => return Ok(RunOutcome::Completed(self.unreadable_task(task_id, e).await)),
        };

        let entry = self.execute(&task, guard).await;
        Ok(RunOutcome::Completed(entry))
    }

    /// The task row exists but could not be loaded. The trigger still gets a
    /// failed log entry; run times stay as they are since the frequency is unknown.
    async fn unreadable_task(&self, task_id: &str, error: CrawlWatchError) -> TaskLogEntry {
        let mut entry = TaskLogEntry::open_for_task_id(task_id, self.clock.now());
        if let Err(e) = self.logs.open(&entry).await {
            tracing::warn!("⚠️ Failed to open log for {task_id}: {e}");
        }
        tracing::warn!("❌ Could not load task {task_id}: {error}");
        entry.finish(self.clock.now(), Some(format!("Could not load task: {error}")));
        self.close_log(&entry).await;
        entry
    }

    /// Admin "run immediately". Same path as a timer trigger, but a held lock
    /// is reported as [`CrawlWatchError::TaskBusy`].
    pub async fn run_now(&self, task_id: &str) -> Result<TaskLogEntry> {
        match self.run_task(task_id).await? {
            RunOutcome::Completed(entry) => Ok(entry),
            RunOutcome::Skipped => Err(CrawlWatchError::TaskBusy(task_id.to_string())),
        }
    }

    async fn execute(&self, task: &CrawlTask, guard: RunGuard) -> TaskLogEntry {
        tracing::debug!("🔒 Run lock held: {}", guard.key());
        let _permit = match &self.permits {
            Some(sem) => Arc::clone(sem).acquire_owned().await.ok(),
            None => None,
        };

        let start = self.clock.now();
        let mut entry = TaskLogEntry::open_for_task(task, start);
        if let Err(e) = self.logs.open(&entry).await {
            tracing::warn!("⚠️ Failed to open log for '{}': {e}", task.name);
        }
        tracing::info!("🕷️ Crawl started: '{}' ({} / {})", task.name, task.platform, task.target_identifier);

        let stats = self.crawl(task).await;

        // Run times advance on failure too.
        let finished_at = self.clock.now();
        self.record_run(task, finished_at).await;

        entry.crawled_count = stats.crawled;
        entry.new_count = stats.inserted;
        entry.updated_count = stats.known;
        entry.finish(self.clock.now(), stats.error);
        self.close_log(&entry).await;

        match &entry.error {
            None => tracing::info!(
                "✅ Crawl finished: '{}' crawled={} new={} known={} ({}ms)",
                task.name,
                entry.crawled_count,
                entry.new_count,
                entry.updated_count,
                entry.execution_time_ms
            ),
            Some(e) => tracing::warn!("❌ Crawl failed: '{}': {e}", task.name),
        }
        entry
    }

    async fn crawl(&self, task: &CrawlTask) -> CrawlStats {
        let works = match self.fetch(task).await {
            Ok(works) => works,
            Err(e) => return CrawlStats::failed(e),
        };
        let crawled = works.len() as u32;

        let known: HashSet<ContentKey> = match self.contents.existing_keys(task.platform).await {
            Ok(ids) => ids
                .iter()
                .map(|id| ContentKey::new(task.platform, id))
                .collect(),
            Err(e) => {
                // insert_if_absent still rejects duplicates
                tracing::warn!("⚠️ Could not load known keys for {}: {e}", task.platform);
                HashSet::new()
            }
        };

        let batch = dedup::partition(&known, works);
        if batch.duplicate_count > 0 {
            tracing::debug!(
                "🔁 Dropped {} repeated item(s) from '{}' batch",
                batch.duplicate_count,
                task.name
            );
        }
        let attempted = batch.new_items.len();
        let mut stats = CrawlStats {
            crawled,
            known: batch.known_count,
            ..CrawlStats::default()
        };

        let mut failures = 0usize;
        let mut last_error = None;
        for work in &batch.new_items {
            match self.contents.insert_if_absent(work, &task.id).await {
                Ok(true) => stats.inserted += 1,
                // Another writer stored it between existing_keys and now
                Ok(false) => stats.known += 1,
                Err(e) => {
                    tracing::warn!("⚠️ Failed to store {}/{}: {e}", work.platform, work.content_id);
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures * 2 > attempted {
            if let Some(e) = last_error {
                stats.error = Some(format!(
                    "{failures} of {attempted} new items failed to persist: {e}"
                ));
            }
        }
        stats
    }

    /// Adapter call bounded by the fetch timeout, with panics contained.
    async fn fetch(&self, task: &CrawlTask) -> Result<Vec<Work>> {
        let adapter = self.crawlers.get(task.platform)?;
        let call = AssertUnwindSafe(adapter.fetch_works(&task.target_identifier, &task.config))
            .catch_unwind();

        let joined = match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| CrawlWatchError::Timeout(limit))?,
            None => call.await,
        };

        joined.unwrap_or_else(|_| {
            Err(CrawlWatchError::Crawl(format!(
                "{} adapter panicked",
                task.platform
            )))
        })
    }

    async fn record_run(&self, task: &CrawlTask, finished_at: DateTime<Utc>) {
        let next = next_fire_time(task.frequency, finished_at);
        if let Err(e) = self
            .tasks
            .update_run_metadata(&task.id, finished_at, next)
            .await
        {
            tracing::warn!("⚠️ Failed to update run times for '{}': {e}", task.name);
        }
    }

    async fn close_log(&self, entry: &TaskLogEntry) {
        if let Err(e) = self.logs.finish(entry).await {
            tracing::warn!("⚠️ Failed to close log {}: {e}", entry.id);
        }
    }

    // ─── System jobs ──────────────────────────────────────

    /// Run a backup/hotsearch job under the same lock and log discipline as
    /// author tasks. The lock key is `job:<name>`.
    pub async fn run_job(&self, job: &dyn SystemJob) -> RunOutcome {
        let key = job_lock_key(job.name());
        let Some(_guard) = self.locks.try_acquire(&key) else {
            tracing::debug!("⏭️ Job '{}' still running, trigger skipped", job.name());
            return RunOutcome::Skipped;
        };

        let mut entry = TaskLogEntry::open_for_job(job.name(), job.kind(), self.clock.now());
        if let Err(e) = self.logs.open(&entry).await {
            tracing::warn!("⚠️ Failed to open log for job '{}': {e}", job.name());
        }
        tracing::info!("🔔 System job started: '{}'", job.name());

        let result = AssertUnwindSafe(job.run())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(CrawlWatchError::Crawl(format!("job '{}' panicked", job.name()))));

        let error = match result {
            Ok(JobReport { crawled_count, detail }) => {
                entry.crawled_count = crawled_count;
                if let Some(detail) = detail {
                    tracing::info!("✅ System job '{}': {detail}", job.name());
                }
                None
            }
            Err(e) => {
                tracing::warn!("❌ System job '{}' failed: {e}", job.name());
                Some(e.to_string())
            }
        };
        entry.finish(self.clock.now(), error);
        self.close_log(&entry).await;
        RunOutcome::Completed(entry)
    }
}

pub fn job_lock_key(name: &str) -> String {
    format!("job:{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use crawlwatch_core::clock::ManualClock;
    use crawlwatch_core::traits::CrawlAdapter;
    use crawlwatch_core::types::{
        Engagement, Frequency, LogStatus, LogType, MediaKind, Platform, TaskConfig,
    };

    fn work(id: &str) -> Work {
        Work {
            platform: Platform::Douyin,
            content_id: id.into(),
            title: format!("title {id}"),
            author: "author1".into(),
            description: String::new(),
            media_kind: MediaKind::Video,
            cover_url: String::new(),
            media_url: String::new(),
            source_url: String::new(),
            created_at: None,
            engagement: Engagement::default(),
        }
    }

    enum Behavior {
        Works(Vec<&'static str>),
        Fail,
        Hang,
        Panic,
    }

    struct FakeAdapter(Behavior);

    #[async_trait]
    impl CrawlAdapter for FakeAdapter {
        fn platform(&self) -> Platform {
            Platform::Douyin
        }

        async fn fetch_works(&self, _target: &str, _config: &TaskConfig) -> Result<Vec<Work>> {
            match &self.0 {
                Behavior::Works(ids) => Ok(ids.iter().map(|id| work(id)).collect()),
                Behavior::Fail => Err(CrawlWatchError::Crawl("upstream 502".into())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
                Behavior::Panic => panic!("parser bug"),
            }
        }

        fn normalize_target(&self, input: &str) -> Result<String> {
            Ok(input.to_string())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        engine: ExecutionEngine,
        task: CrawlTask,
    }

    async fn fixture(behavior: Behavior) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap(),
        ));
        let mut crawlers = CrawlerRegistry::new();
        crawlers.register(Arc::new(FakeAdapter(behavior)));
        let engine = ExecutionEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(crawlers),
            clock.clone(),
        );
        let task = CrawlTask::new("watch", Platform::Douyin, "author1", Frequency::Hourly);
        store.create_task(&task).await.unwrap();
        Fixture { store, clock, engine, task }
    }

    #[tokio::test]
    async fn test_success_counts_and_bookkeeping() {
        let f = fixture(Behavior::Works(vec!["w1", "w2", "w3"])).await;
        f.store.seed_content(&work("w1"));

        let entry = f.engine.run_now(&f.task.id).await.unwrap();
        assert_eq!(entry.status, LogStatus::Success);
        assert_eq!(entry.crawled_count, 3);
        assert_eq!(entry.new_count, 2);
        assert_eq!(entry.updated_count, 1);

        let now = f.clock.now();
        let stored = f.store.get_task(&f.task.id).await.unwrap().unwrap();
        assert_eq!(stored.last_run_at, Some(now));
        assert_eq!(stored.next_run_at, Some(now + ChronoDuration::hours(1)));
        assert_eq!(f.store.content_count(), 3);
        assert!(!f.engine.is_running(&f.task.id));
    }

    #[tokio::test]
    async fn test_fetch_error_still_advances_next_run() {
        let f = fixture(Behavior::Fail).await;
        let entry = f.engine.run_now(&f.task.id).await.unwrap();
        assert_eq!(entry.status, LogStatus::Failed);
        assert_eq!(entry.crawled_count, 0);
        assert!(entry.error.unwrap().contains("upstream 502"));

        let stored = f.store.get_task(&f.task.id).await.unwrap().unwrap();
        assert_eq!(
            stored.next_run_at,
            Some(f.clock.now() + ChronoDuration::hours(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_fetch_times_out() {
        let f = fixture(Behavior::Hang).await;
        let engine = f.engine.with_fetch_timeout(Duration::from_secs(5));
        let entry = engine.run_now(&f.task.id).await.unwrap();
        assert_eq!(entry.status, LogStatus::Failed);
        assert!(entry.error.unwrap().contains("Timed out after 5s"));
        assert!(!engine.is_running(&f.task.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_second_timeout_keeps_unit() {
        let f = fixture(Behavior::Hang).await;
        let engine = f.engine.with_fetch_timeout(Duration::from_millis(250));
        let entry = engine.run_now(&f.task.id).await.unwrap();
        assert!(entry.error.unwrap().contains("Timed out after 250ms"));
    }

    #[tokio::test]
    async fn test_adapter_panic_is_contained() {
        let f = fixture(Behavior::Panic).await;
        let entry = f.engine.run_now(&f.task.id).await.unwrap();
        assert_eq!(entry.status, LogStatus::Failed);
        assert!(entry.error.unwrap().contains("panicked"));
        assert!(!f.engine.is_running(&f.task.id));
    }

    #[tokio::test]
    async fn test_minority_insert_failures_keep_success() {
        let f = fixture(Behavior::Works(vec!["a", "b", "c"])).await;
        f.store.fail_inserts_for("b");

        let entry = f.engine.run_now(&f.task.id).await.unwrap();
        assert_eq!(entry.status, LogStatus::Success);
        assert_eq!(entry.new_count, 2);
    }

    #[tokio::test]
    async fn test_dominant_insert_failures_fail_run() {
        let f = fixture(Behavior::Works(vec!["a", "b", "c"])).await;
        f.store.fail_inserts_for("a");
        f.store.fail_inserts_for("c");

        let entry = f.engine.run_now(&f.task.id).await.unwrap();
        assert_eq!(entry.status, LogStatus::Failed);
        assert_eq!(entry.new_count, 1);
        assert!(entry.error.unwrap().contains("2 of 3"));
    }

    #[tokio::test]
    async fn test_missing_task() {
        let f = fixture(Behavior::Works(vec![])).await;
        let err = f.engine.run_now("nope").await.unwrap_err();
        assert!(matches!(err, CrawlWatchError::TaskNotFound(_)));
        assert!(!f.engine.is_running("nope"));
    }

    /// Task table that is present but unreadable.
    struct UnreadableTasks;

    #[async_trait]
    impl TaskStore for UnreadableTasks {
        async fn list_enabled_tasks(&self) -> Result<Vec<CrawlTask>> {
            Err(CrawlWatchError::Database("disk I/O error".into()))
        }
        async fn list_tasks(&self) -> Result<Vec<CrawlTask>> {
            Err(CrawlWatchError::Database("disk I/O error".into()))
        }
        async fn get_task(&self, _id: &str) -> Result<Option<CrawlTask>> {
            Err(CrawlWatchError::Database("disk I/O error".into()))
        }
        async fn create_task(&self, _task: &CrawlTask) -> Result<()> {
            Ok(())
        }
        async fn update_task(&self, _task: &CrawlTask) -> Result<()> {
            Ok(())
        }
        async fn delete_task(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }
        async fn set_enabled(&self, _id: &str, _enabled: bool) -> Result<Option<CrawlTask>> {
            Ok(None)
        }
        async fn update_run_metadata(
            &self,
            _id: &str,
            _last: DateTime<Utc>,
            _next: DateTime<Utc>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unreadable_task_still_logs_failure() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap(),
        ));
        let engine = ExecutionEngine::new(
            Arc::new(UnreadableTasks),
            store.clone(),
            store.clone(),
            Arc::new(CrawlerRegistry::new()),
            clock,
        );

        let entry = engine.run_now("t-9").await.unwrap();
        assert_eq!(entry.status, LogStatus::Failed);
        assert_eq!(entry.task_id.as_deref(), Some("t-9"));
        assert!(entry.error.unwrap().contains("disk I/O error"));
        assert_eq!(store.log_entries().len(), 1);
        assert!(!engine.is_running("t-9"));
    }

    #[tokio::test]
    async fn test_busy_task_is_skipped_without_log() {
        let f = fixture(Behavior::Works(vec!["a"])).await;
        let _held = f.engine.locks.try_acquire(&f.task.id).unwrap();

        assert_eq!(f.engine.run_task(&f.task.id).await.unwrap(), RunOutcome::Skipped);
        assert!(matches!(
            f.engine.run_now(&f.task.id).await,
            Err(CrawlWatchError::TaskBusy(_))
        ));
        assert!(f.store.log_entries().is_empty());
    }

    struct CountingJob(Result<JobReport>);

    #[async_trait]
    impl SystemJob for CountingJob {
        fn name(&self) -> &str {
            "hotsearch"
        }
        fn kind(&self) -> LogType {
            LogType::Hotsearch
        }
        fn cron(&self) -> &str {
            "0 8,12,16,20 * * *"
        }
        async fn run(&self) -> Result<JobReport> {
            match &self.0 {
                Ok(report) => Ok(report.clone()),
                Err(e) => Err(CrawlWatchError::Crawl(e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_system_job_logged_with_sentinel() {
        let f = fixture(Behavior::Works(vec![])).await;
        let job = CountingJob(Ok(JobReport { crawled_count: 40, detail: None }));
        let outcome = f.engine.run_job(&job).await;
        let entry = outcome.entry().unwrap();
        assert_eq!(entry.status, LogStatus::Success);
        assert_eq!(entry.crawled_count, 40);
        assert!(entry.task_id.is_none());
        assert_eq!(entry.platform, "all");
        assert_eq!(entry.log_type, LogType::Hotsearch);

        let failing = CountingJob(Err(CrawlWatchError::Crawl("all sources down".into())));
        let entry = f.engine.run_job(&failing).await.entry().cloned().unwrap();
        assert_eq!(entry.status, LogStatus::Failed);
        assert_eq!(f.store.log_entries().len(), 2);
    }
}
