//! In-memory stores: the same traits as [`crate::persistence::CrawlDb`],
//! held in process memory. Backs the engine and scheduler tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crawlwatch_core::error::{CrawlWatchError, Result};
use crawlwatch_core::traits::{ContentStore, LogSink, SnapshotStore, TaskStore};
use crawlwatch_core::types::{
    ContentKey, CrawlTask, HotItem, LogPage, LogQuery, Platform, TaskLogEntry, Work,
};

/// A stored content row: the work plus the task that ingested it.
#[derive(Debug, Clone)]
pub struct StoredContent {
    pub work: Work,
    pub task_id: String,
}

#[derive(Default)]
struct Inner {
    tasks: BTreeMap<String, CrawlTask>,
    contents: HashMap<ContentKey, StoredContent>,
    logs: Vec<TaskLogEntry>,
    snapshots: HashMap<(Platform, NaiveDate), Vec<HotItem>>,
    failing_inserts: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pre-populate a content row as if a previous run had stored it.
    pub fn seed_content(&self, work: &Work) {
        self.lock().contents.insert(
            work.key(),
            StoredContent {
                work: work.clone(),
                task_id: String::new(),
            },
        );
    }

    /// Make every insert of `content_id` fail with a database error.
    pub fn fail_inserts_for(&self, content_id: &str) {
        self.lock().failing_inserts.insert(content_id.to_string());
    }

    pub fn content_count(&self) -> usize {
        self.lock().contents.len()
    }

    pub fn content(&self, key: &ContentKey) -> Option<StoredContent> {
        self.lock().contents.get(key).cloned()
    }

    /// All log entries in write order.
    pub fn log_entries(&self) -> Vec<TaskLogEntry> {
        self.lock().logs.clone()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn list_enabled_tasks(&self) -> Result<Vec<CrawlTask>> {
        Ok(self.lock().tasks.values().filter(|t| t.enabled).cloned().collect())
    }

    async fn list_tasks(&self) -> Result<Vec<CrawlTask>> {
        let mut tasks: Vec<CrawlTask> = self.lock().tasks.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn get_task(&self, id: &str) -> Result<Option<CrawlTask>> {
        Ok(self.lock().tasks.get(id).cloned())
    }

    async fn create_task(&self, task: &CrawlTask) -> Result<()> {
        let mut inner = self.lock();
        if inner.tasks.contains_key(&task.id) {
            return Err(CrawlWatchError::Database(format!("task {} already exists", task.id)));
        }
        inner.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &CrawlTask) -> Result<()> {
        let mut inner = self.lock();
        let stored = inner
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| CrawlWatchError::TaskNotFound(task.id.clone()))?;
        let last_run_at = stored.last_run_at;
        *stored = task.clone();
        stored.last_run_at = last_run_at;
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<bool> {
        Ok(self.lock().tasks.remove(id).is_some())
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<Option<CrawlTask>> {
        let mut inner = self.lock();
        Ok(inner.tasks.get_mut(id).map(|t| {
            t.enabled = enabled;
            t.clone()
        }))
    }

    async fn update_run_metadata(
        &self,
        id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(task) = self.lock().tasks.get_mut(id) {
            task.last_run_at = Some(last_run_at);
            task.next_run_at = Some(next_run_at);
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn existing_keys(&self, platform: Platform) -> Result<HashSet<String>> {
        Ok(self
            .lock()
            .contents
            .keys()
            .filter(|k| k.platform == platform)
            .map(|k| k.content_id.clone())
            .collect())
    }

    async fn insert_if_absent(&self, work: &Work, task_id: &str) -> Result<bool> {
        let mut inner = self.lock();
        if inner.failing_inserts.contains(&work.content_id) {
            return Err(CrawlWatchError::Database(format!(
                "insert rejected for {}",
                work.content_id
            )));
        }
        let key = work.key();
        if inner.contents.contains_key(&key) {
            return Ok(false);
        }
        inner.contents.insert(
            key,
            StoredContent {
                work: work.clone(),
                task_id: task_id.to_string(),
            },
        );
        Ok(true)
    }
}

#[async_trait]
impl LogSink for MemoryStore {
    async fn open(&self, entry: &TaskLogEntry) -> Result<()> {
        self.lock().logs.push(entry.clone());
        Ok(())
    }

    async fn finish(&self, entry: &TaskLogEntry) -> Result<()> {
        let mut inner = self.lock();
        match inner.logs.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry.clone(),
            None => inner.logs.push(entry.clone()),
        }
        Ok(())
    }

    async fn list(&self, query: &LogQuery) -> Result<LogPage> {
        let inner = self.lock();
        let mut matching: Vec<&TaskLogEntry> = inner
            .logs
            .iter()
            .filter(|e| match &query.task_id {
                Some(id) => e.task_id.as_deref() == Some(id.as_str()),
                None => true,
            })
            .filter(|e| query.status.is_none_or(|s| e.status == s))
            .collect();
        // Newest first; write order breaks ties
        matching.reverse();
        matching.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        Ok(LogPage {
            total: matching.len() as u64,
            entries: matching
                .into_iter()
                .skip(query.offset())
                .take(query.page_size as usize)
                .cloned()
                .collect(),
            page: query.page.max(1),
            page_size: query.page_size,
        })
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save_snapshot(
        &self,
        platform: Platform,
        capture_date: NaiveDate,
        _captured_at: DateTime<Utc>,
        items: &[HotItem],
    ) -> Result<()> {
        self.lock()
            .snapshots
            .insert((platform, capture_date), items.to_vec());
        Ok(())
    }

    async fn load_snapshot(
        &self,
        platform: Platform,
        capture_date: NaiveDate,
    ) -> Result<Option<Vec<HotItem>>> {
        Ok(self.lock().snapshots.get(&(platform, capture_date)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crawlwatch_core::types::{Engagement, Frequency, LogStatus, LogType, MediaKind};

    fn work(id: &str) -> Work {
        Work {
            platform: Platform::Bilibili,
            content_id: id.into(),
            title: id.into(),
            author: "up".into(),
            description: String::new(),
            media_kind: MediaKind::Video,
            cover_url: String::new(),
            media_url: String::new(),
            source_url: String::new(),
            created_at: None,
            engagement: Engagement::default(),
        }
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_create_only() {
        let store = MemoryStore::new();
        let mut w = work("bv1");
        assert!(store.insert_if_absent(&w, "t1").await.unwrap());
        w.title = "changed".into();
        assert!(!store.insert_if_absent(&w, "t2").await.unwrap());

        let stored = store.content(&w.key()).unwrap();
        assert_eq!(stored.work.title, "bv1");
        assert_eq!(stored.task_id, "t1");
        assert_eq!(
            store.existing_keys(Platform::Bilibili).await.unwrap(),
            HashSet::from(["bv1".to_string()])
        );
        assert!(store.existing_keys(Platform::Weibo).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_task_keeps_last_run() {
        let store = MemoryStore::new();
        let task = CrawlTask::new("t", Platform::Weibo, "123", Frequency::Daily);
        store.create_task(&task).await.unwrap();
        let ran = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        store
            .update_run_metadata(&task.id, ran, ran + Duration::days(1))
            .await
            .unwrap();

        let mut edited = task.clone();
        edited.name = "renamed".into();
        store.update_task(&edited).await.unwrap();
        let stored = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "renamed");
        assert_eq!(stored.last_run_at, Some(ran));
        assert!(store.create_task(&task).await.is_err());
    }

    #[tokio::test]
    async fn test_log_list_filters_and_pages_newest_first() {
        let store = MemoryStore::new();
        let base = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        for i in 0..5 {
            let mut e = TaskLogEntry::open_for_job("backup", LogType::Backup, base + Duration::hours(i));
            e.task_id = Some(if i % 2 == 0 { "even" } else { "odd" }.into());
            store.open(&e).await.unwrap();
            e.finish(e.start_time, (i == 4).then(|| "boom".to_string()));
            store.finish(&e).await.unwrap();
        }

        let page = store
            .list(&LogQuery { page: 1, page_size: 2, ..LogQuery::for_task("even") })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].start_time, base + Duration::hours(4));

        let failed = store
            .list(&LogQuery { status: Some(LogStatus::Failed), ..LogQuery::default() })
            .await
            .unwrap();
        assert_eq!(failed.total, 1);

        let last = store
            .list(&LogQuery { page: 3, page_size: 2, ..LogQuery::default() })
            .await
            .unwrap();
        assert_eq!(last.entries.len(), 1);
        assert_eq!(last.total, 5);
    }
}
