//! Xiaohongshu author adapter: note ids from the profile page.

use async_trait::async_trait;
use crawlwatch_core::config::CrawlerConfig;
use crawlwatch_core::error::Result;
use crawlwatch_core::traits::CrawlAdapter;
use crawlwatch_core::types::{MediaKind, Platform, TaskConfig, Work};
use regex::Regex;

use crate::http::{collect_ids, compile, work_from_link, PageFetcher};
use crate::link::normalize_target;

pub struct XiaohongshuAdapter {
    fetcher: PageFetcher,
    note_link: Regex,
    video_note: Regex,
}

impl XiaohongshuAdapter {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(config)?,
            note_link: compile(r#"(?:/explore/|/discovery/item/|"noteId":")([0-9a-f]{24})"#)?,
            video_note: compile(r#""noteId":"([0-9a-f]{24})"[^{}]{0,200}"type":"video""#)?,
        })
    }

    pub fn profile_url(author_id: &str) -> String {
        format!("https://www.xiaohongshu.com/user/profile/{author_id}")
    }

    pub fn parse_profile(&self, author_id: &str, body: &str) -> Vec<Work> {
        let videos = collect_ids(&self.video_note, body);
        collect_ids(&self.note_link, body)
            .into_iter()
            .map(|id| {
                let kind = if videos.contains(&id) { MediaKind::Video } else { MediaKind::Image };
                let url = format!("https://www.xiaohongshu.com/explore/{id}");
                work_from_link(Platform::Xiaohongshu, author_id, &id, kind, url)
            })
            .collect()
    }
}

#[async_trait]
impl CrawlAdapter for XiaohongshuAdapter {
    fn platform(&self) -> Platform {
        Platform::Xiaohongshu
    }

    async fn fetch_works(&self, target: &str, config: &TaskConfig) -> Result<Vec<Work>> {
        let body = self.fetcher.get_text(&Self::profile_url(target), config).await?;
        let works = self.parse_profile(target, &body);
        if works.is_empty() {
            tracing::warn!("⚠️ No notes found on Xiaohongshu profile {target} (cookies expired?)");
        }
        Ok(works)
    }

    fn normalize_target(&self, input: &str) -> Result<String> {
        normalize_target(Platform::Xiaohongshu, input)
    }
}
