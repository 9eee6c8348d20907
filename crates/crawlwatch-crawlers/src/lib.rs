//! # CrawlWatch Crawlers
//!
//! One [`CrawlAdapter`](crawlwatch_core::traits::CrawlAdapter) per supported
//! platform, registered in a [`CrawlerRegistry`] keyed by [`Platform`](crawlwatch_core::Platform).
//! Adding a platform is a pure addition: a new adapter module plus one
//! `register` call in [`CrawlerRegistry::with_defaults`].
//!
//! ```text
//! CrawlerRegistry
//!   ├── douyin       → /user/{id}            (video links)
//!   ├── xiaohongshu  → /user/profile/{id}    (note links)
//!   ├── kuaishou     → /profile/{id}         (short-video links)
//!   ├── bilibili     → space.bilibili.com    (BV ids)
//!   └── weibo        → m.weibo.cn container API (JSON)
//! ```

pub mod bilibili;
pub mod douyin;
pub mod hotsearch;
pub mod http;
pub mod kuaishou;
pub mod link;
pub mod registry;
pub mod weibo;
pub mod xiaohongshu;

pub use hotsearch::default_hotsearch_sources;
pub use link::normalize_target;
pub use registry::CrawlerRegistry;
