//! Data model shared by the scheduler, the crawlers and the stores.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CrawlWatchError;

/// Opaque adapter configuration attached to a task (cookies, tokens, ...).
pub type TaskConfig = serde_json::Map<String, serde_json::Value>;

/// `contents.source_type` value for items ingested by a monitoring task.
pub const SOURCE_TYPE_MONITORING: i32 = 2;

/// Platform name used on log rows written by system jobs.
pub const SYSTEM_PLATFORM: &str = "all";

// ─── Platform ─────────────────────────────────────────────

/// Supported content platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Douyin,
    Xiaohongshu,
    Kuaishou,
    Bilibili,
    Weibo,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Douyin,
        Platform::Xiaohongshu,
        Platform::Kuaishou,
        Platform::Bilibili,
        Platform::Weibo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Douyin => "douyin",
            Platform::Xiaohongshu => "xiaohongshu",
            Platform::Kuaishou => "kuaishou",
            Platform::Bilibili => "bilibili",
            Platform::Weibo => "weibo",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CrawlWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "douyin" => Ok(Platform::Douyin),
            "xiaohongshu" => Ok(Platform::Xiaohongshu),
            "kuaishou" => Ok(Platform::Kuaishou),
            "bilibili" => Ok(Platform::Bilibili),
            "weibo" => Ok(Platform::Weibo),
            other => Err(CrawlWatchError::UnsupportedPlatform(other.to_string())),
        }
    }
}

// ─── Frequency ────────────────────────────────────────────

/// How often a task re-checks its author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
}

impl Frequency {
    /// Nominal interval between two fires.
    pub fn interval(&self) -> Duration {
        match self {
            Frequency::Hourly => Duration::hours(1),
            Frequency::Daily => Duration::days(1),
            Frequency::Weekly => Duration::days(7),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = CrawlWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(CrawlWatchError::InvalidFrequency(other.to_string())),
        }
    }
}

// ─── CrawlTask ────────────────────────────────────────────

/// A persisted "watch this author on this platform" definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlTask {
    pub id: String,
    pub name: String,
    pub platform: Platform,
    /// Author handle/id on the platform.
    pub target_identifier: String,
    pub frequency: Frequency,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub config: TaskConfig,
    pub created_at: DateTime<Utc>,
}

impl CrawlTask {
    /// New enabled task with a fresh id.
    pub fn new(name: &str, platform: Platform, target: &str, frequency: Frequency) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            platform,
            target_identifier: target.to_string(),
            frequency,
            enabled: true,
            last_run_at: None,
            next_run_at: None,
            config: TaskConfig::new(),
            created_at: Utc::now(),
        }
    }

    /// Persisted `status` column: 1 enabled, 0 disabled.
    pub fn status_code(&self) -> i32 {
        if self.enabled { 1 } else { 0 }
    }
}

// ─── Work / Content ───────────────────────────────────────

/// Media kind of a discovered item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
        }
    }
}

/// Optional engagement counters scraped alongside a work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub share_count: Option<u64>,
}

/// One item as returned by a crawl adapter, before dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub platform: Platform,
    /// Platform-scoped id used for dedup.
    pub content_id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub description: String,
    pub media_kind: MediaKind,
    pub cover_url: String,
    pub media_url: String,
    pub source_url: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub engagement: Engagement,
}

impl Work {
    pub fn key(&self) -> ContentKey {
        ContentKey::new(self.platform, &self.content_id)
    }
}

/// Unique key of a stored content row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentKey {
    pub platform: Platform,
    pub content_id: String,
}

impl ContentKey {
    pub fn new(platform: Platform, content_id: &str) -> Self {
        Self {
            platform,
            content_id: content_id.to_string(),
        }
    }
}

// ─── Task logs ────────────────────────────────────────────

/// Lifecycle of one log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Running,
    Success,
    Failed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Running => "running",
            LogStatus::Success => "success",
            LogStatus::Failed => "failed",
        }
    }
}

impl FromStr for LogStatus {
    type Err = CrawlWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(LogStatus::Running),
            "success" => Ok(LogStatus::Success),
            "failed" => Ok(LogStatus::Failed),
            other => Err(CrawlWatchError::Config(format!("unknown log status '{other}'"))),
        }
    }
}

/// What produced a log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Author,
    Hotsearch,
    Backup,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Author => "author",
            LogType::Hotsearch => "hotsearch",
            LogType::Backup => "backup",
        }
    }
}

impl FromStr for LogType {
    type Err = CrawlWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "author" => Ok(LogType::Author),
            "hotsearch" => Ok(LogType::Hotsearch),
            "backup" => Ok(LogType::Backup),
            other => Err(CrawlWatchError::Config(format!("unknown log type '{other}'"))),
        }
    }
}

/// Execution history row. One per trigger, `running` then `success|failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub id: String,
    /// `None` for system jobs.
    pub task_id: Option<String>,
    pub task_name: String,
    pub platform: String,
    pub log_type: LogType,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: LogStatus,
    pub crawled_count: u32,
    pub new_count: u32,
    pub updated_count: u32,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

impl TaskLogEntry {
    /// Open a `running` entry for an author task.
    pub fn open_for_task(task: &CrawlTask, start: DateTime<Utc>) -> Self {
        Self::open(
            Some(task.id.clone()),
            &task.name,
            task.platform.as_str(),
            LogType::Author,
            start,
        )
    }

    /// Open a `running` entry for a task whose row could not be read. Name
    /// and platform are unknown, so the id stands in for the name.
    pub fn open_for_task_id(task_id: &str, start: DateTime<Utc>) -> Self {
        Self::open(Some(task_id.to_string()), task_id, "unknown", LogType::Author, start)
    }

    /// Open a `running` entry for a system job.
    pub fn open_for_job(name: &str, log_type: LogType, start: DateTime<Utc>) -> Self {
        Self::open(None, name, SYSTEM_PLATFORM, log_type, start)
    }

    fn open(
        task_id: Option<String>,
        task_name: &str,
        platform: &str,
        log_type: LogType,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id,
            task_name: task_name.to_string(),
            platform: platform.to_string(),
            log_type,
            start_time: start,
            end_time: None,
            status: LogStatus::Running,
            crawled_count: 0,
            new_count: 0,
            updated_count: 0,
            execution_time_ms: 0,
            error: None,
        }
    }

    /// Close the entry. `error = Some(..)` marks it failed.
    pub fn finish(&mut self, end: DateTime<Utc>, error: Option<String>) {
        self.end_time = Some(end);
        self.execution_time_ms = (end - self.start_time).num_milliseconds().max(0) as u64;
        self.status = if error.is_some() {
            LogStatus::Failed
        } else {
            LogStatus::Success
        };
        self.error = error;
    }
}

/// Filter + page for reading logs back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogQuery {
    pub task_id: Option<String>,
    pub status: Option<LogStatus>,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            task_id: None,
            status: None,
            page: 1,
            page_size: 20,
        }
    }
}

impl LogQuery {
    pub fn for_task(task_id: &str) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            ..Self::default()
        }
    }

    /// Row offset of the requested page.
    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.page_size as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPage {
    pub entries: Vec<TaskLogEntry>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

// ─── Hotsearch ────────────────────────────────────────────

/// One row of a platform's trending list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotItem {
    pub rank: u32,
    pub keyword: String,
    pub heat: u64,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_platform_roundtrip_and_unknown() {
        for p in Platform::ALL {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
        assert_eq!(" Weibo ".parse::<Platform>().unwrap(), Platform::Weibo);
        assert!(matches!(
            "tiktok".parse::<Platform>(),
            Err(CrawlWatchError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn test_frequency_parse_rejects_unknown() {
        assert_eq!("daily".parse::<Frequency>().unwrap(), Frequency::Daily);
        assert!(matches!(
            "monthly".parse::<Frequency>(),
            Err(CrawlWatchError::InvalidFrequency(_))
        ));
    }

    #[test]
    fn test_log_entry_finish_sets_status_and_duration() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let task = CrawlTask::new("watch", Platform::Douyin, "author1", Frequency::Hourly);
        let mut entry = TaskLogEntry::open_for_task(&task, start);
        assert_eq!(entry.status, LogStatus::Running);
        assert_eq!(entry.task_id.as_deref(), Some(task.id.as_str()));

        entry.finish(start + Duration::milliseconds(1500), None);
        assert_eq!(entry.status, LogStatus::Success);
        assert_eq!(entry.execution_time_ms, 1500);

        let mut failed = TaskLogEntry::open_for_job("daily backup", LogType::Backup, start);
        failed.finish(start, Some("disk full".into()));
        assert_eq!(failed.status, LogStatus::Failed);
        assert_eq!(failed.platform, SYSTEM_PLATFORM);
        assert!(failed.task_id.is_none());
    }

    #[test]
    fn test_log_query_offset() {
        let q = LogQuery { page: 3, page_size: 10, ..LogQuery::default() };
        assert_eq!(q.offset(), 20);
        let q = LogQuery { page: 0, page_size: 10, ..LogQuery::default() };
        assert_eq!(q.offset(), 0);
    }
}
