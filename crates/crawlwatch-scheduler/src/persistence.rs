//! SQLite-backed persistence for crawl tasks, ingested contents, execution
//! logs and hotsearch snapshots. One connection behind a mutex, WAL mode.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crawlwatch_core::error::{CrawlWatchError, Result};
use crawlwatch_core::traits::{ContentStore, LogSink, SnapshotStore, TaskStore};
use crawlwatch_core::types::{
    CrawlTask, HotItem, LogPage, LogQuery, LogStatus, LogType, Platform, SOURCE_TYPE_MONITORING,
    TaskConfig, TaskLogEntry, Work,
};

pub struct CrawlDb {
    conn: Mutex<Connection>,
}

impl CrawlDb {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        tracing::debug!("🗄️ Database opened: {}", path.display());
        Ok(db)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn().execute_batch(
            "
            -- Monitoring tasks: one author on one platform
            CREATE TABLE IF NOT EXISTS crawl_tasks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                platform TEXT NOT NULL,
                target_identifier TEXT NOT NULL,
                frequency TEXT NOT NULL,         -- 'hourly', 'daily', 'weekly'
                status INTEGER NOT NULL DEFAULT 1,
                last_run_at TEXT,
                next_run_at TEXT,
                config TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            -- Ingested works, unique per platform
            CREATE TABLE IF NOT EXISTS contents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform TEXT NOT NULL,
                content_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                author TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                media_type TEXT NOT NULL,        -- 'video', 'image'
                cover_url TEXT NOT NULL DEFAULT '',
                media_url TEXT NOT NULL DEFAULT '',
                source_url TEXT NOT NULL DEFAULT '',
                source_type INTEGER NOT NULL,
                task_id TEXT,
                view_count INTEGER,
                like_count INTEGER,
                comment_count INTEGER,
                share_count INTEGER,
                published_at TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (platform, content_id)
            );

            -- Execution history, one row per trigger
            CREATE TABLE IF NOT EXISTS task_logs (
                id TEXT PRIMARY KEY,
                task_id TEXT,                    -- NULL for system jobs
                task_name TEXT NOT NULL,
                platform TEXT NOT NULL,
                type TEXT NOT NULL,              -- 'author', 'hotsearch', 'backup'
                start_time TEXT NOT NULL,
                end_time TEXT,
                status TEXT NOT NULL,            -- 'running', 'success', 'failed'
                crawled_count INTEGER NOT NULL DEFAULT 0,
                new_count INTEGER NOT NULL DEFAULT 0,
                updated_count INTEGER NOT NULL DEFAULT 0,
                execution_time_ms INTEGER NOT NULL DEFAULT 0,
                error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_task_logs_task ON task_logs (task_id, start_time);

            -- Daily trending lists
            CREATE TABLE IF NOT EXISTS hotsearch_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform TEXT NOT NULL,
                capture_date TEXT NOT NULL,      -- YYYY-MM-DD
                capture_time TEXT NOT NULL,
                snapshot_data TEXT NOT NULL,     -- JSON array of items
                UNIQUE (platform, capture_date)
            );
            ",
        )?;
        Ok(())
    }

    /// Consistent copy of the live database at `dest` (`VACUUM INTO`).
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        let dest_str = dest.to_string_lossy().to_string();
        if dest.exists() {
            return Err(CrawlWatchError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{dest_str} already exists"),
            )));
        }
        self.conn().execute("VACUUM INTO ?1", [&dest_str])?;
        Ok(())
    }

    /// Number of stored content rows.
    pub fn content_count(&self) -> Result<u64> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM contents", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

// ─── Row helpers ──────────────────────────────────────

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn conversion_error(col: usize, e: CrawlWatchError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
}

const TASK_COLUMNS: &str = "id, name, platform, target_identifier, frequency, status, \
                            last_run_at, next_run_at, config, created_at";

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CrawlTask> {
    let platform: String = row.get(2)?;
    let frequency: String = row.get(4)?;
    let config: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    Ok(CrawlTask {
        id: row.get(0)?,
        name: row.get(1)?,
        platform: platform.parse().map_err(|e| conversion_error(2, e))?,
        target_identifier: row.get(3)?,
        frequency: frequency.parse().map_err(|e| conversion_error(4, e))?,
        enabled: row.get::<_, i32>(5)? != 0,
        last_run_at: row.get::<_, Option<String>>(6)?.as_deref().and_then(parse_ts),
        next_run_at: row.get::<_, Option<String>>(7)?.as_deref().and_then(parse_ts),
        config: serde_json::from_str::<TaskConfig>(&config).unwrap_or_default(),
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    })
}

const LOG_COLUMNS: &str = "id, task_id, task_name, platform, type, start_time, end_time, status, \
                           crawled_count, new_count, updated_count, execution_time_ms, error";

fn log_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskLogEntry> {
    let log_type: String = row.get(4)?;
    let start_time: String = row.get(5)?;
    let status: String = row.get(7)?;
    Ok(TaskLogEntry {
        id: row.get(0)?,
        task_id: row.get(1)?,
        task_name: row.get(2)?,
        platform: row.get(3)?,
        log_type: log_type.parse::<LogType>().map_err(|e| conversion_error(4, e))?,
        start_time: parse_ts(&start_time).unwrap_or_else(Utc::now),
        end_time: row.get::<_, Option<String>>(6)?.as_deref().and_then(parse_ts),
        status: status.parse::<LogStatus>().map_err(|e| conversion_error(7, e))?,
        crawled_count: row.get(8)?,
        new_count: row.get(9)?,
        updated_count: row.get(10)?,
        execution_time_ms: row.get::<_, i64>(11)?.max(0) as u64,
        error: row.get(12)?,
    })
}

fn write_log(conn: &Connection, entry: &TaskLogEntry) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO task_logs
         (id, task_id, task_name, platform, type, start_time, end_time, status,
          crawled_count, new_count, updated_count, execution_time_ms, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            entry.id,
            entry.task_id,
            entry.task_name,
            entry.platform,
            entry.log_type.as_str(),
            ts(entry.start_time),
            entry.end_time.map(ts),
            entry.status.as_str(),
            entry.crawled_count,
            entry.new_count,
            entry.updated_count,
            entry.execution_time_ms as i64,
            entry.error,
        ],
    )?;
    Ok(())
}

// ─── Tasks ────────────────────────────────────────────

#[async_trait]
impl TaskStore for CrawlDb {
    async fn list_enabled_tasks(&self) -> Result<Vec<CrawlTask>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM crawl_tasks WHERE status = 1 ORDER BY created_at"
        ))?;
        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    async fn list_tasks(&self) -> Result<Vec<CrawlTask>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM crawl_tasks ORDER BY created_at DESC"
        ))?;
        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    async fn get_task(&self, id: &str) -> Result<Option<CrawlTask>> {
        let task = self
            .conn()
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM crawl_tasks WHERE id = ?1"),
                [id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    async fn create_task(&self, task: &CrawlTask) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO crawl_tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                task.id,
                task.name,
                task.platform.as_str(),
                task.target_identifier,
                task.frequency.as_str(),
                task.status_code(),
                task.last_run_at.map(ts),
                task.next_run_at.map(ts),
                serde_json::to_string(&task.config)?,
                ts(task.created_at),
            ],
        )?;
        Ok(())
    }

    async fn update_task(&self, task: &CrawlTask) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE crawl_tasks SET name = ?2, platform = ?3, target_identifier = ?4,
                    frequency = ?5, status = ?6, next_run_at = ?7, config = ?8
             WHERE id = ?1",
            params![
                task.id,
                task.name,
                task.platform.as_str(),
                task.target_identifier,
                task.frequency.as_str(),
                task.status_code(),
                task.next_run_at.map(ts),
                serde_json::to_string(&task.config)?,
            ],
        )?;
        if changed == 0 {
            return Err(CrawlWatchError::TaskNotFound(task.id.clone()));
        }
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM crawl_tasks WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<Option<CrawlTask>> {
        let changed = self.conn().execute(
            "UPDATE crawl_tasks SET status = ?2 WHERE id = ?1",
            params![id, enabled as i32],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_task(id).await
    }

    async fn update_run_metadata(
        &self,
        id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE crawl_tasks SET last_run_at = ?2, next_run_at = ?3 WHERE id = ?1",
            params![id, ts(last_run_at), ts(next_run_at)],
        )?;
        Ok(())
    }
}

// ─── Contents ─────────────────────────────────────────

#[async_trait]
impl ContentStore for CrawlDb {
    async fn existing_keys(&self, platform: Platform) -> Result<HashSet<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT content_id FROM contents WHERE platform = ?1")?;
        let ids = stmt
            .query_map([platform.as_str()], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    async fn insert_if_absent(&self, work: &Work, task_id: &str) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO contents
             (platform, content_id, title, author, description, media_type, cover_url,
              media_url, source_url, source_type, task_id, view_count, like_count,
              comment_count, share_count, published_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                work.platform.as_str(),
                work.content_id,
                work.title,
                work.author,
                work.description,
                work.media_kind.as_str(),
                work.cover_url,
                work.media_url,
                work.source_url,
                SOURCE_TYPE_MONITORING,
                task_id,
                work.engagement.view_count.map(|v| v as i64),
                work.engagement.like_count.map(|v| v as i64),
                work.engagement.comment_count.map(|v| v as i64),
                work.engagement.share_count.map(|v| v as i64),
                work.created_at.map(ts),
                ts(Utc::now()),
            ],
        )?;
        Ok(inserted == 1)
    }
}

// ─── Logs ─────────────────────────────────────────────

#[async_trait]
impl LogSink for CrawlDb {
    async fn open(&self, entry: &TaskLogEntry) -> Result<()> {
        write_log(&self.conn(), entry)
    }

    async fn finish(&self, entry: &TaskLogEntry) -> Result<()> {
        write_log(&self.conn(), entry)
    }

    async fn list(&self, query: &LogQuery) -> Result<LogPage> {
        let conn = self.conn();
        let status = query.status.map(|s| s.as_str());
        let filter = "(?1 IS NULL OR task_id = ?1) AND (?2 IS NULL OR status = ?2)";

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM task_logs WHERE {filter}"),
            params![query.task_id, status],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM task_logs WHERE {filter}
             ORDER BY start_time DESC, rowid DESC LIMIT ?3 OFFSET ?4"
        ))?;
        let entries = stmt
            .query_map(
                params![
                    query.task_id,
                    status,
                    query.page_size as i64,
                    query.offset() as i64
                ],
                log_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(LogPage {
            entries,
            total: total as u64,
            page: query.page.max(1),
            page_size: query.page_size,
        })
    }
}

// ─── Hotsearch snapshots ──────────────────────────────

#[async_trait]
impl SnapshotStore for CrawlDb {
    async fn save_snapshot(
        &self,
        platform: Platform,
        capture_date: NaiveDate,
        captured_at: DateTime<Utc>,
        items: &[HotItem],
    ) -> Result<()> {
        let data = serde_json::to_string(items)?;
        self.conn().execute(
            "INSERT INTO hotsearch_snapshots (platform, capture_date, capture_time, snapshot_data)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (platform, capture_date)
             DO UPDATE SET capture_time = excluded.capture_time, snapshot_data = excluded.snapshot_data",
            params![
                platform.as_str(),
                capture_date.format("%Y-%m-%d").to_string(),
                ts(captured_at),
                data
            ],
        )?;
        Ok(())
    }

    async fn load_snapshot(
        &self,
        platform: Platform,
        capture_date: NaiveDate,
    ) -> Result<Option<Vec<HotItem>>> {
        let data: Option<String> = self
            .conn()
            .query_row(
                "SELECT snapshot_data FROM hotsearch_snapshots
                 WHERE platform = ?1 AND capture_date = ?2",
                params![platform.as_str(), capture_date.format("%Y-%m-%d").to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
