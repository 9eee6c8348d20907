//! Production wiring: SQLite stores, built-in adapters, system jobs.

use std::sync::Arc;

use crawlwatch_core::clock::{Clock, SystemClock};
use crawlwatch_core::config::CrawlWatchConfig;
use crawlwatch_core::error::Result;
use crawlwatch_core::traits::SystemJob;
use crawlwatch_crawlers::{CrawlerRegistry, default_hotsearch_sources};

use crate::engine::ExecutionEngine;
use crate::jobs::{BackupJob, HotsearchJob};
use crate::persistence::CrawlDb;
use crate::registry::SchedulerRegistry;
use crate::service::TaskService;

pub struct Runtime {
    pub db: Arc<CrawlDb>,
    pub engine: Arc<ExecutionEngine>,
    pub scheduler: Arc<SchedulerRegistry>,
    pub service: TaskService,
    pub backup: Arc<BackupJob>,
}

impl Runtime {
    /// Open the configured database and assemble every component.
    /// Nothing is armed until [`SchedulerRegistry::start`] is called.
    pub fn open(config: &CrawlWatchConfig) -> Result<Self> {
        let db = Arc::new(CrawlDb::open(&config.database.resolved_path())?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let crawlers = Arc::new(CrawlerRegistry::with_defaults(&config.crawler)?);

        let engine = Arc::new(
            ExecutionEngine::new(
                db.clone(),
                db.clone(),
                db.clone(),
                crawlers.clone(),
                clock.clone(),
            )
            .with_limits(&config.scheduler),
        );

        let backup = Arc::new(BackupJob::new(
            db.clone(),
            config.backup.resolved_dir(),
            config.backup.retention_days,
            &config.scheduler.backup_cron,
            clock.clone(),
        ));

        let mut scheduler = SchedulerRegistry::new(engine.clone(), db.clone(), clock.clone());
        if config.scheduler.system_jobs {
            let hotsearch = HotsearchJob::new(
                default_hotsearch_sources(&config.crawler)?,
                db.clone(),
                config.crawler.hotsearch_limit,
                &config.scheduler.hotsearch_cron,
                clock.clone(),
            );
            scheduler = scheduler
                .with_system_job(backup.clone() as Arc<dyn SystemJob>)
                .with_system_job(Arc::new(hotsearch));
        }
        let scheduler = Arc::new(scheduler);

        let service = TaskService::new(db.clone(), db.clone(), crawlers, scheduler.clone(), clock);

        Ok(Self {
            db,
            engine,
            scheduler,
            service,
            backup,
        })
    }
}
