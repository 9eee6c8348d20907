//! Scheduler Registry: owns the live set of armed timers.
//!
//! One tokio timer per enabled task, plus one per system job. A task timer
//! sleeps until the task's stored `next_run_at`, fires, waits for the run's
//! bookkeeping and reads the task again, so the next fire is always one
//! interval after the previous run completed. The run is spawned on its own
//! tokio task: disarming a timer never cancels an execution already in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::task::JoinHandle;

use crawlwatch_core::clock::Clock;
use crawlwatch_core::error::Result;
use crawlwatch_core::traits::{SystemJob, TaskStore};
use crawlwatch_core::types::CrawlTask;

use crate::cron;
use crate::engine::{ExecutionEngine, RunOutcome};
use crate::frequency::next_fire_time;

/// Back-off when the task store cannot be read.
const STORE_RETRY: Duration = Duration::from_secs(60);
/// Poll while another trigger (usually "run now") holds the task's lock.
const BUSY_POLL: Duration = Duration::from_secs(1);

pub struct SchedulerRegistry {
    engine: Arc<ExecutionEngine>,
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    jobs: Vec<Arc<dyn SystemJob>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    job_timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SchedulerRegistry {
    pub fn new(
        engine: Arc<ExecutionEngine>,
        tasks: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            tasks,
            clock,
            jobs: Vec::new(),
            timers: Mutex::new(HashMap::new()),
            job_timers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a system job to be armed by [`start`](Self::start).
    pub fn with_system_job(mut self, job: Arc<dyn SystemJob>) -> Self {
        self.jobs.push(job);
        self
    }

    /// Arm every enabled task from the store plus the system jobs.
    /// Returns the number of task timers armed.
    pub async fn start(&self) -> Result<usize> {
        let tasks = self.tasks.list_enabled_tasks().await?;
        for task in &tasks {
            self.add_or_update(task);
        }
        for job in &self.jobs {
            self.arm_job(Arc::clone(job));
        }
        tracing::info!(
            "⏰ Scheduler started: {} task timer(s), {} system job(s)",
            tasks.len(),
            self.jobs.len()
        );
        Ok(tasks.len())
    }

    /// Replace whatever timer exists for `task.id`; arm a new one only if the
    /// task is enabled. Must be called from within a tokio runtime.
    pub fn add_or_update(&self, task: &CrawlTask) {
        let mut timers = lock(&self.timers);
        if let Some(old) = timers.remove(&task.id) {
            old.abort();
        }
        if !task.enabled {
            tracing::debug!("⏸️ Task '{}' disabled, timer not armed", task.name);
            return;
        }

        let handle = tokio::spawn(task_timer(
            Arc::clone(&self.engine),
            Arc::clone(&self.tasks),
            Arc::clone(&self.clock),
            task.id.clone(),
        ));
        timers.insert(task.id.clone(), handle);
        tracing::debug!(
            "📅 Task '{}' armed: {} (next run {})",
            task.name,
            task.frequency,
            task.next_run_at
                .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "after one interval".into())
        );
    }

    /// Disarm a task's timer. An in-flight run for it is left alone.
    pub fn remove(&self, task_id: &str) -> bool {
        match lock(&self.timers).remove(task_id) {
            Some(handle) => {
                handle.abort();
                tracing::debug!("🗑️ Task {task_id} disarmed");
                true
            }
            None => false,
        }
    }

    /// Disarm everything, system jobs included.
    pub fn stop_all(&self) {
        let mut n = 0;
        for map in [&self.timers, &self.job_timers] {
            for (_, handle) in lock(map).drain() {
                handle.abort();
                n += 1;
            }
        }
        tracing::info!("⏹️ Scheduler stopped ({n} timer(s) disarmed)");
    }

    pub fn is_armed(&self, task_id: &str) -> bool {
        lock(&self.timers).contains_key(task_id)
    }

    /// Armed task timers, system jobs excluded.
    pub fn armed_count(&self) -> usize {
        lock(&self.timers).len()
    }

    pub fn armed_job_count(&self) -> usize {
        lock(&self.job_timers).len()
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    fn arm_job(&self, job: Arc<dyn SystemJob>) {
        if !cron::is_valid(job.cron()) {
            tracing::warn!(
                "⚠️ System job '{}' has invalid cron '{}', not armed",
                job.name(),
                job.cron()
            );
            return;
        }
        let name = job.name().to_string();
        let handle = tokio::spawn(job_timer(
            Arc::clone(&self.engine),
            Arc::clone(&self.clock),
            job,
        ));
        if let Some(old) = lock(&self.job_timers).insert(name, handle) {
            old.abort();
        }
    }
}

impl Drop for SchedulerRegistry {
    fn drop(&mut self) {
        for map in [&self.timers, &self.job_timers] {
            for (_, handle) in lock(map).drain() {
                handle.abort();
            }
        }
    }
}

fn lock(map: &Mutex<HashMap<String, JoinHandle<()>>>) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
    map.lock().unwrap_or_else(|e| e.into_inner())
}

/// When the timer should fire next. The stored `next_run_at` wins, unless
/// it has not moved past the previous fire (bookkeeping failed) or the task
/// never had one; then one interval from now, fixed once chosen.
fn next_due(
    task: &CrawlTask,
    fired: Option<DateTime<Utc>>,
    fallback: &mut Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match task.next_run_at {
        Some(at) if fired.is_none_or(|prev| at > prev) => at,
        _ => *fallback.get_or_insert_with(|| next_fire_time(task.frequency, now)),
    }
}

async fn task_timer(
    engine: Arc<ExecutionEngine>,
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    task_id: String,
) {
    let mut fired = None;
    let mut fallback = None;
    loop {
        let task = match tasks.get_task(&task_id).await {
            Ok(Some(task)) if task.enabled => task,
            Ok(_) => {
                tracing::debug!("⏹️ Task {task_id} deleted or disabled, timer stopped");
                return;
            }
            Err(e) => {
                tracing::warn!("⚠️ Could not read task {task_id}: {e}");
                tokio::time::sleep(STORE_RETRY).await;
                continue;
            }
        };

        let now = clock.now();
        let due = next_due(&task, fired, &mut fallback, now);
        let wait = (due - now).to_std().unwrap_or(Duration::ZERO);
        if !wait.is_zero() {
            // re-read on wake: "run now" or an edit may have moved next_run_at
            tokio::time::sleep(wait).await;
            continue;
        }

        let run = tokio::spawn({
            let engine = Arc::clone(&engine);
            let task_id = task_id.clone();
            async move { engine.run_task(&task_id).await }
        });
        match run.await {
            Ok(Ok(RunOutcome::Completed(_))) => {}
            Ok(Ok(RunOutcome::Skipped)) => {
                while engine.is_running(&task_id) {
                    tokio::time::sleep(BUSY_POLL).await;
                }
            }
            Ok(Err(e)) => tracing::warn!("⚠️ Scheduled run of {task_id} aborted: {e}"),
            Err(e) => tracing::warn!("⚠️ Scheduled run of {task_id} did not finish: {e}"),
        }
        fired = Some(due);
        fallback = None;
    }
}

async fn job_timer(engine: Arc<ExecutionEngine>, clock: Arc<dyn Clock>, job: Arc<dyn SystemJob>) {
    let mut after = clock.now();
    loop {
        let Some(next) = cron::next_run_from_cron(job.cron(), after.with_timezone(&Local)) else {
            return;
        };
        let next = next.with_timezone(&Utc);
        let wait = (next - clock.now()).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!("⏰ Job '{}' next at {}", job.name(), next.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
        tokio::time::sleep(wait).await;

        let engine = Arc::clone(&engine);
        let fired = Arc::clone(&job);
        tokio::spawn(async move {
            engine.run_job(fired.as_ref()).await;
        });
        // never re-fire the same minute, even if the wall clock lags
        after = next.max(clock.now());
    }
}
