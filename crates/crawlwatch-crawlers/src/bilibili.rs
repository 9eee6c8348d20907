//! Bilibili author adapter: BV ids from the uploader's space page.

use async_trait::async_trait;
use crawlwatch_core::config::CrawlerConfig;
use crawlwatch_core::error::Result;
use crawlwatch_core::traits::CrawlAdapter;
use crawlwatch_core::types::{MediaKind, Platform, TaskConfig, Work};
use regex::Regex;

use crate::http::{collect_ids, compile, work_from_link, PageFetcher};
use crate::link::normalize_target;

pub struct BilibiliAdapter {
    fetcher: PageFetcher,
    bvid: Regex,
}

impl BilibiliAdapter {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(config)?,
            bvid: compile(r"\b(BV[0-9A-Za-z]{10})\b")?,
        })
    }

    pub fn space_url(mid: &str) -> String {
        format!("https://space.bilibili.com/{mid}/video")
    }

    pub fn parse_space(&self, mid: &str, body: &str) -> Vec<Work> {
        collect_ids(&self.bvid, body)
            .into_iter()
            .map(|bv| {
                let url = format!("https://www.bilibili.com/video/{bv}");
                work_from_link(Platform::Bilibili, mid, &bv, MediaKind::Video, url)
            })
            .collect()
    }
}

#[async_trait]
impl CrawlAdapter for BilibiliAdapter {
    fn platform(&self) -> Platform {
        Platform::Bilibili
    }

    async fn fetch_works(&self, target: &str, config: &TaskConfig) -> Result<Vec<Work>> {
        let body = self.fetcher.get_text(&Self::space_url(target), config).await?;
        let works = self.parse_space(target, &body);
        if works.is_empty() {
            tracing::warn!("⚠️ No videos found in Bilibili space {target}");
        }
        Ok(works)
    }

    fn normalize_target(&self, input: &str) -> Result<String> {
        normalize_target(Platform::Bilibili, input)
    }
}
