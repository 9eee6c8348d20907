//! Crawl adapter registry: platform → adapter lookup table built at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crawlwatch_core::config::CrawlerConfig;
use crawlwatch_core::error::{CrawlWatchError, Result};
use crawlwatch_core::traits::CrawlAdapter;
use crawlwatch_core::types::Platform;

use crate::bilibili::BilibiliAdapter;
use crate::douyin::DouyinAdapter;
use crate::kuaishou::KuaishouAdapter;
use crate::weibo::WeiboAdapter;
use crate::xiaohongshu::XiaohongshuAdapter;

#[derive(Default, Clone)]
pub struct CrawlerRegistry {
    adapters: HashMap<Platform, Arc<dyn CrawlAdapter>>,
}

impl CrawlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in adapter for every supported platform.
    pub fn with_defaults(config: &CrawlerConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(DouyinAdapter::new(config)?));
        registry.register(Arc::new(XiaohongshuAdapter::new(config)?));
        registry.register(Arc::new(KuaishouAdapter::new(config)?));
        registry.register(Arc::new(BilibiliAdapter::new(config)?));
        registry.register(Arc::new(WeiboAdapter::new(config)?));
        Ok(registry)
    }

    /// Register an adapter, replacing any previous one for the same platform.
    pub fn register(&mut self, adapter: Arc<dyn CrawlAdapter>) -> Option<Arc<dyn CrawlAdapter>> {
        let platform = adapter.platform();
        tracing::debug!("🔌 Crawl adapter registered: {platform}");
        self.adapters.insert(platform, adapter)
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn CrawlAdapter>> {
        self.adapters
            .get(&platform)
            .cloned()
            .ok_or_else(|| CrawlWatchError::UnsupportedPlatform(platform.to_string()))
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.adapters.keys().copied().collect();
        platforms.sort();
        platforms
    }

    /// Validate and normalize a target through the platform's adapter.
    pub fn normalize_target(&self, platform: Platform, input: &str) -> Result<String> {
        self.get(platform)?.normalize_target(input)
    }
}
