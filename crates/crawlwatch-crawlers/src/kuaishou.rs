//! Kuaishou author adapter.

use async_trait::async_trait;
use crawlwatch_core::config::CrawlerConfig;
use crawlwatch_core::error::Result;
use crawlwatch_core::traits::CrawlAdapter;
use crawlwatch_core::types::{MediaKind, Platform, TaskConfig, Work};
use regex::Regex;

use crate::http::{collect_ids, compile, work_from_link, PageFetcher};
use crate::link::normalize_target;

pub struct KuaishouAdapter {
    fetcher: PageFetcher,
    video_link: Regex,
}

impl KuaishouAdapter {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(config)?,
            video_link: compile(r"/short-video/([0-9A-Za-z_-]{6,})")?,
        })
    }

    pub fn profile_url(author_id: &str) -> String {
        format!("https://www.kuaishou.com/profile/{author_id}")
    }

    pub fn parse_profile(&self, author_id: &str, body: &str) -> Vec<Work> {
        collect_ids(&self.video_link, body)
            .into_iter()
            .map(|id| {
                let url = format!("https://www.kuaishou.com/short-video/{id}");
                work_from_link(Platform::Kuaishou, author_id, &id, MediaKind::Video, url)
            })
            .collect()
    }
}

#[async_trait]
impl CrawlAdapter for KuaishouAdapter {
    fn platform(&self) -> Platform {
        Platform::Kuaishou
    }

    async fn fetch_works(&self, target: &str, config: &TaskConfig) -> Result<Vec<Work>> {
        let body = self.fetcher.get_text(&Self::profile_url(target), config).await?;
        let works = self.parse_profile(target, &body);
        if works.is_empty() {
            tracing::warn!("⚠️ No videos found on Kuaishou profile {target}");
        }
        Ok(works)
    }

    fn normalize_target(&self, input: &str) -> Result<String> {
        normalize_target(Platform::Kuaishou, input)
    }
}
