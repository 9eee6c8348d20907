//! Fixed-schedule system jobs: nightly database backup and the
//! four-times-daily hotsearch capture.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, Utc};

use crawlwatch_core::clock::Clock;
use crawlwatch_core::error::{CrawlWatchError, Result};
use crawlwatch_core::traits::{HotsearchSource, JobReport, SnapshotStore, SystemJob};
use crawlwatch_core::types::LogType;

use crate::persistence::CrawlDb;

const BACKUP_PREFIX: &str = "crawlwatch_backup_";
const BACKUP_SUFFIX: &str = ".db";
const BACKUP_STAMP: &str = "%Y%m%d_%H%M%S";

// ─── Backup ───────────────────────────────────────────

pub struct BackupJob {
    db: Arc<CrawlDb>,
    dir: PathBuf,
    retention_days: u32,
    cron: String,
    clock: Arc<dyn Clock>,
}

impl BackupJob {
    pub fn new(
        db: Arc<CrawlDb>,
        dir: PathBuf,
        retention_days: u32,
        cron: &str,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            dir,
            retention_days,
            cron: cron.to_string(),
            clock,
        }
    }

    /// Take one backup and prune old ones. Returns the new file's path.
    pub fn backup_now(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let now = self.clock.now();
        let path = self.dir.join(backup_file_name(now));
        self.db.backup_to(&path)?;
        tracing::info!("💾 Database backed up to {}", path.display());

        let removed = prune_backups(&self.dir, now, self.retention_days)?;
        if removed > 0 {
            tracing::info!("🧹 Removed {removed} backup(s) older than {} days", self.retention_days);
        }
        Ok(path)
    }
}

#[async_trait]
impl SystemJob for BackupJob {
    fn name(&self) -> &str {
        "database backup"
    }

    fn kind(&self) -> LogType {
        LogType::Backup
    }

    fn cron(&self) -> &str {
        &self.cron
    }

    async fn run(&self) -> Result<JobReport> {
        let path = self.backup_now()?;
        Ok(JobReport {
            crawled_count: 0,
            detail: Some(path.display().to_string()),
        })
    }
}

/// `crawlwatch_backup_YYYYMMDD_HHMMSS.db`, stamped in local time.
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!(
        "{BACKUP_PREFIX}{}{BACKUP_SUFFIX}",
        at.with_timezone(&Local).format(BACKUP_STAMP)
    )
}

fn backup_taken_at(file_name: &str) -> Option<DateTime<Utc>> {
    let stamp = file_name
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(BACKUP_SUFFIX)?;
    let naive = NaiveDateTime::parse_from_str(stamp, BACKUP_STAMP).ok()?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// Delete backups whose name stamp is older than `retention_days`.
/// Files that don't look like backups are left alone.
pub fn prune_backups(dir: &Path, now: DateTime<Utc>, retention_days: u32) -> Result<usize> {
    let cutoff = now - chrono::Duration::days(retention_days as i64);
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(taken_at) = backup_taken_at(&name) else {
            continue;
        };
        if taken_at < cutoff {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("⚠️ Failed to delete old backup {name}: {e}"),
            }
        }
    }
    Ok(removed)
}

// ─── Hotsearch ────────────────────────────────────────

pub struct HotsearchJob {
    sources: Vec<Arc<dyn HotsearchSource>>,
    snapshots: Arc<dyn SnapshotStore>,
    limit: usize,
    cron: String,
    clock: Arc<dyn Clock>,
}

impl HotsearchJob {
    pub fn new(
        sources: Vec<Arc<dyn HotsearchSource>>,
        snapshots: Arc<dyn SnapshotStore>,
        limit: usize,
        cron: &str,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sources,
            snapshots,
            limit,
            cron: cron.to_string(),
            clock,
        }
    }
}

#[async_trait]
impl SystemJob for HotsearchJob {
    fn name(&self) -> &str {
        "hotsearch capture"
    }

    fn kind(&self) -> LogType {
        LogType::Hotsearch
    }

    fn cron(&self) -> &str {
        &self.cron
    }

    async fn run(&self) -> Result<JobReport> {
        if self.sources.is_empty() {
            return Ok(JobReport {
                crawled_count: 0,
                detail: Some("no hotsearch sources configured".into()),
            });
        }

        let now = self.clock.now();
        let capture_date = now.with_timezone(&Local).date_naive();
        let mut captured = 0u32;
        let mut saved = Vec::new();
        let mut failures = Vec::new();

        for source in &self.sources {
            let platform = source.platform();
            let result = match source.fetch_hot(self.limit).await {
                Ok(items) => self
                    .snapshots
                    .save_snapshot(platform, capture_date, now, &items)
                    .await
                    .map(|_| items.len()),
                Err(e) => Err(e),
            };
            match result {
                Ok(n) => {
                    tracing::debug!("🔥 {platform} hotsearch: {n} items");
                    captured += n as u32;
                    saved.push(platform.to_string());
                }
                Err(e) => {
                    tracing::warn!("⚠️ {platform} hotsearch failed: {e}");
                    failures.push(format!("{platform}: {e}"));
                }
            }
        }

        if saved.is_empty() {
            return Err(CrawlWatchError::Crawl(format!(
                "all hotsearch sources failed ({})",
                failures.join("; ")
            )));
        }

        let mut detail = format!("{captured} items from {}", saved.join(", "));
        if !failures.is_empty() {
            detail.push_str(&format!("; failed: {}", failures.join("; ")));
        }
        Ok(JobReport {
            crawled_count: captured,
            detail: Some(detail),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use crawlwatch_core::clock::ManualClock;
    use crawlwatch_core::types::{HotItem, Platform};

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("crawlwatch-{tag}-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_backup_name_roundtrips_through_parser() {
        let at = Utc.with_ymd_and_hms(2026, 7, 4, 2, 0, 0).unwrap();
        let name = backup_file_name(at);
        assert!(name.starts_with("crawlwatch_backup_"));
        assert!(name.ends_with(".db"));
        assert_eq!(backup_taken_at(&name), Some(at));
        assert_eq!(backup_taken_at("notes.txt"), None);
    }

    #[test]
    fn test_prune_keeps_recent_and_foreign_files() {
        let dir = temp_dir("prune");
        std::fs::create_dir_all(&dir).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 7, 10, 2, 0, 0).unwrap();
        let old = dir.join(backup_file_name(now - Duration::days(8)));
        let recent = dir.join(backup_file_name(now - Duration::days(6)));
        let foreign = dir.join("keep-me.db");
        for p in [&old, &recent, &foreign] {
            std::fs::write(p, b"x").unwrap();
        }

        assert_eq!(prune_backups(&dir, now, 7).unwrap(), 1);
        assert!(!old.exists());
        assert!(recent.exists());
        assert!(foreign.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_backup_job_writes_file() {
        let dir = temp_dir("backup");
        let db = Arc::new(CrawlDb::open(&dir.join("live.db")).unwrap());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 7, 10, 2, 0, 0).unwrap()));
        let job = BackupJob::new(db, dir.join("backups"), 7, "0 2 * * *", clock);

        let report = job.run().await.unwrap();
        let path = PathBuf::from(report.detail.unwrap());
        assert!(path.exists());
        assert_eq!(job.kind(), LogType::Backup);
        let _ = std::fs::remove_dir_all(&dir);
    }

    struct FakeSource(Platform, Option<usize>);

    #[async_trait]
    impl HotsearchSource for FakeSource {
        fn platform(&self) -> Platform {
            self.0
        }

        async fn fetch_hot(&self, limit: usize) -> Result<Vec<HotItem>> {
            match self.1 {
                Some(n) => Ok((1..=n.min(limit))
                    .map(|rank| HotItem {
                        rank: rank as u32,
                        keyword: format!("kw{rank}"),
                        heat: 100,
                        url: String::new(),
                    })
                    .collect()),
                None => Err(CrawlWatchError::Http("503".into())),
            }
        }
    }

    fn hotsearch(sources: Vec<Arc<dyn HotsearchSource>>, store: Arc<MemoryStore>) -> HotsearchJob {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 7, 10, 12, 0, 0).unwrap()));
        HotsearchJob::new(sources, store, 10, "0 8,12,16,20 * * *", clock)
    }

    #[tokio::test]
    async fn test_hotsearch_partial_failure_succeeds() {
        let store = Arc::new(MemoryStore::new());
        let job = hotsearch(
            vec![
                Arc::new(FakeSource(Platform::Weibo, Some(30))),
                Arc::new(FakeSource(Platform::Bilibili, None)),
            ],
            store.clone(),
        );
        let report = job.run().await.unwrap();
        assert_eq!(report.crawled_count, 10);
        assert!(report.detail.unwrap().contains("bilibili"));

        let day = Utc
            .with_ymd_and_hms(2026, 7, 10, 12, 0, 0)
            .unwrap()
            .with_timezone(&Local)
            .date_naive();
        assert_eq!(
            store.load_snapshot(Platform::Weibo, day).await.unwrap().unwrap().len(),
            10
        );
    }

    #[tokio::test]
    async fn test_hotsearch_total_failure_fails() {
        let store = Arc::new(MemoryStore::new());
        let job = hotsearch(vec![Arc::new(FakeSource(Platform::Douyin, None))], store);
        let err = job.run().await.unwrap_err();
        assert!(err.to_string().contains("all hotsearch sources failed"));
    }
}
