//! Douyin author adapter: scrapes video links off the profile page.

use async_trait::async_trait;
use crawlwatch_core::config::CrawlerConfig;
use crawlwatch_core::error::Result;
use crawlwatch_core::traits::CrawlAdapter;
use crawlwatch_core::types::{MediaKind, Platform, TaskConfig, Work};
use regex::Regex;

use crate::http::{collect_ids, compile, work_from_link, PageFetcher};
use crate::link::normalize_target;

pub struct DouyinAdapter {
    fetcher: PageFetcher,
    video_link: Regex,
}

impl DouyinAdapter {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(config)?,
            video_link: compile(r"(?:/video/|aweme_id=|\\u002Fvideo\\u002F)(\d{8,})")?,
        })
    }

    pub fn profile_url(author_id: &str) -> String {
        format!("https://www.douyin.com/user/{author_id}")
    }

    /// Extract works from profile HTML.
    pub fn parse_profile(&self, author_id: &str, body: &str) -> Vec<Work> {
        collect_ids(&self.video_link, body)
            .into_iter()
            .map(|id| {
                let url = format!("https://www.douyin.com/video/{id}");
                work_from_link(Platform::Douyin, author_id, &id, MediaKind::Video, url)
            })
            .collect()
    }
}

#[async_trait]
impl CrawlAdapter for DouyinAdapter {
    fn platform(&self) -> Platform {
        Platform::Douyin
    }

    async fn fetch_works(&self, target: &str, config: &TaskConfig) -> Result<Vec<Work>> {
        let body = self.fetcher.get_text(&Self::profile_url(target), config).await?;
        let works = self.parse_profile(target, &body);
        if works.is_empty() {
            tracing::warn!("⚠️ No videos found on Douyin profile {target}");
        }
        Ok(works)
    }

    fn normalize_target(&self, input: &str) -> Result<String> {
        normalize_target(Platform::Douyin, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_links() {
        let adapter = DouyinAdapter::new(&CrawlerConfig::default()).unwrap();
        let html = r#"
            <li><a href="/video/7301234567890123456">first</a></li>
            <li><a href="//www.douyin.com/video/7309876543210987654">second</a></li>
            <li><a href="/video/7301234567890123456">dup</a></li>
        "#;
        let works = adapter.parse_profile("author1", html);
        assert_eq!(works.len(), 2);
        assert_eq!(works[0].content_id, "douyin_7301234567890123456");
        assert_eq!(works[1].source_url, "https://www.douyin.com/video/7309876543210987654");
        assert!(works.iter().all(|w| w.author == "author1" && w.media_kind == MediaKind::Video));
    }
}
