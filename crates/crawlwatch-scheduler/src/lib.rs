//! # CrawlWatch Scheduler
//!
//! Turns "watch this author on this platform at this frequency" records
//! into running, logged, deduplicated crawl executions.
//!
//! ```text
//! SchedulerRegistry ──fire──▶ ExecutionEngine ──▶ CrawlAdapter (per platform)
//!        │                        │
//!        │                        ├── dedup::partition ──▶ ContentStore
//!        │                        ├── frequency::next_fire_time ──▶ TaskStore
//!        │                        └── LogSink
//!        └── system jobs (cron): backup, hotsearch
//! ```

pub mod cron;
pub mod dedup;
pub mod engine;
pub mod frequency;
pub mod jobs;
pub mod lock;
pub mod persistence;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod store;

pub use engine::{ExecutionEngine, RunOutcome};
pub use persistence::CrawlDb;
pub use registry::SchedulerRegistry;
pub use runtime::Runtime;
pub use service::{NewTask, TaskService, TaskUpdate};
pub use store::MemoryStore;
