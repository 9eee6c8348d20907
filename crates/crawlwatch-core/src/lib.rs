//! # CrawlWatch Core
//!
//! Shared building blocks for the recurring author-crawl scheduler:
//! the task/work/log data model, the collaborator traits the scheduler
//! talks to (task store, content store, log sink, crawl adapters),
//! configuration and the common error type.

pub mod clock;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CrawlWatchConfig;
pub use error::{CrawlWatchError, Result};
pub use types::*;
