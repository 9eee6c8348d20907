//! CrawlWatch configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CrawlWatchError, Result};
use crate::types::Platform;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlWatchConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
}

impl CrawlWatchConfig {
    /// Load config from the default path (~/.crawlwatch/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let config = if path.exists() {
            tracing::debug!("📄 Loading config from {}", path.display());
            Self::load_from(&path)?
        } else {
            tracing::debug!("📄 No config at {}, using defaults", path.display());
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CrawlWatchError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CrawlWatchError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CrawlWatchError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// `CRAWLWATCH_DB` and `CRAWLWATCH_BACKUP_DIR` win over file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(db) = std::env::var("CRAWLWATCH_DB") {
            self.database.path = db;
        }
        if let Ok(dir) = std::env::var("CRAWLWATCH_BACKUP_DIR") {
            self.backup.dir = dir;
        }
        self
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the CrawlWatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".crawlwatch")
    }
}

/// Expand `~` and env vars in a configured path.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.crawlwatch/crawlwatch.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

/// Scheduler / execution engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper wall-clock bound for one adapter fetch. 0 disables it.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Cap on simultaneously running triggers. 0 = unbounded.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    #[serde(default = "bool_true")]
    pub system_jobs: bool,
    #[serde(default = "default_backup_cron")]
    pub backup_cron: String,
    #[serde(default = "default_hotsearch_cron")]
    pub hotsearch_cron: String,
}

fn bool_true() -> bool { true }
fn default_fetch_timeout_secs() -> u64 { 600 }
fn default_max_concurrent_runs() -> usize { 4 }
fn default_backup_cron() -> String { "0 2 * * *".into() }
fn default_hotsearch_cron() -> String { "0 8,12,16,20 * * *".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_concurrent_runs: default_max_concurrent_runs(),
            system_jobs: true,
            backup_cron: default_backup_cron(),
            hotsearch_cron: default_hotsearch_cron(),
        }
    }
}

/// Database backup job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_backup_dir() -> String { "~/.crawlwatch/backups".into() }
fn default_retention_days() -> u32 { 7 }

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            retention_days: default_retention_days(),
        }
    }
}

impl BackupConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        expand_path(&self.dir)
    }
}

/// HTTP crawler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_hotsearch_limit")]
    pub hotsearch_limit: usize,
    #[serde(default = "default_hotsearch_platforms")]
    pub hotsearch_platforms: Vec<Platform>,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".into()
}
fn default_request_timeout_secs() -> u64 { 30 }
fn default_hotsearch_limit() -> usize { 20 }
fn default_hotsearch_platforms() -> Vec<Platform> { Platform::ALL.to_vec() }

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            hotsearch_limit: default_hotsearch_limit(),
            hotsearch_platforms: default_hotsearch_platforms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: CrawlWatchConfig = toml::from_str("").unwrap();
        assert_eq!(config.scheduler.fetch_timeout_secs, 600);
        assert_eq!(config.scheduler.backup_cron, "0 2 * * *");
        assert_eq!(config.scheduler.hotsearch_cron, "0 8,12,16,20 * * *");
        assert_eq!(config.backup.retention_days, 7);
        assert_eq!(config.crawler.hotsearch_platforms.len(), 5);
    }

    #[test]
    fn test_partial_section_override() {
        let config: CrawlWatchConfig = toml::from_str(
            r#"
            [scheduler]
            max_concurrent_runs = 0

            [crawler]
            hotsearch_platforms = ["weibo", "bilibili"]
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.max_concurrent_runs, 0);
        assert_eq!(config.scheduler.fetch_timeout_secs, 600);
        assert_eq!(
            config.crawler.hotsearch_platforms,
            vec![Platform::Weibo, Platform::Bilibili]
        );
    }

    #[test]
    fn test_load_from_missing_file_is_config_error() {
        let path = std::env::temp_dir().join("crawlwatch-no-such-config.toml");
        assert!(matches!(
            CrawlWatchConfig::load_from(&path),
            Err(CrawlWatchError::Config(_))
        ));
    }
}
