//! Weibo author adapter: uses the mobile container API, which returns
//! the uploader's timeline as JSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crawlwatch_core::config::CrawlerConfig;
use crawlwatch_core::error::{CrawlWatchError, Result};
use crawlwatch_core::traits::CrawlAdapter;
use crawlwatch_core::types::{Engagement, MediaKind, Platform, TaskConfig, Work};
use regex::Regex;
use serde_json::Value;

use crate::http::{compile, PageFetcher};
use crate::link::normalize_target;

const TITLE_CHARS: usize = 50;

pub struct WeiboAdapter {
    fetcher: PageFetcher,
    tags: Regex,
}

impl WeiboAdapter {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(config)?,
            tags: compile(r"<[^>]+>")?,
        })
    }

    pub fn timeline_url(uid: &str) -> String {
        format!(
            "https://m.weibo.cn/api/container/getIndex?type=uid&value={uid}&containerid=107603{uid}"
        )
    }

    /// Map a container API response to works. `ok != 1` is an upstream error.
    pub fn parse_timeline(&self, uid: &str, doc: &Value) -> Result<Vec<Work>> {
        if doc["ok"].as_i64() != Some(1) {
            let msg = doc["msg"].as_str().unwrap_or("ok != 1");
            return Err(CrawlWatchError::Crawl(format!("weibo timeline for {uid}: {msg}")));
        }

        let cards = doc["data"]["cards"].as_array().cloned().unwrap_or_default();
        Ok(cards
            .iter()
            .filter_map(|card| card.get("mblog"))
            .filter_map(|mblog| self.parse_post(uid, mblog))
            .collect())
    }

    fn parse_post(&self, uid: &str, mblog: &Value) -> Option<Work> {
        let id = mblog["id"]
            .as_str()
            .map(String::from)
            .or_else(|| mblog["id"].as_u64().map(|n| n.to_string()))?;

        let text = self.tags.replace_all(mblog["text"].as_str().unwrap_or(""), "");
        let text = text.trim().to_string();
        let title: String = text.chars().take(TITLE_CHARS).collect();
        let author = mblog["user"]["screen_name"].as_str().unwrap_or(uid).to_string();
        let source_url = format!("https://m.weibo.cn/detail/{id}");

        let page_info = &mblog["page_info"];
        let (media_kind, cover_url, media_url) = if page_info["type"].as_str() == Some("video") {
            (
                MediaKind::Video,
                page_info["page_pic"]["url"].as_str().unwrap_or("").to_string(),
                page_info["media_info"]["stream_url"]
                    .as_str()
                    .unwrap_or(&source_url)
                    .to_string(),
            )
        } else {
            let first_pic = &mblog["pics"][0];
            let cover = first_pic["url"].as_str().unwrap_or("").to_string();
            let large = first_pic["large"]["url"].as_str().unwrap_or(&cover).to_string();
            let media = if large.is_empty() { source_url.clone() } else { large };
            (MediaKind::Image, cover, media)
        };

        let created_at = mblog["created_at"]
            .as_str()
            .and_then(|s| DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y").ok())
            .map(|d| d.with_timezone(&Utc));

        Some(Work {
            platform: Platform::Weibo,
            content_id: format!("weibo_{id}"),
            title: if title.is_empty() { format!("{author} · {id}") } else { title },
            author,
            description: text,
            media_kind,
            cover_url,
            media_url,
            source_url,
            created_at,
            engagement: Engagement {
                view_count: None,
                like_count: mblog["attitudes_count"].as_u64(),
                comment_count: mblog["comments_count"].as_u64(),
                share_count: mblog["reposts_count"].as_u64(),
            },
        })
    }
}

#[async_trait]
impl CrawlAdapter for WeiboAdapter {
    fn platform(&self) -> Platform {
        Platform::Weibo
    }

    async fn fetch_works(&self, target: &str, config: &TaskConfig) -> Result<Vec<Work>> {
        let doc = self.fetcher.get_json(&Self::timeline_url(target), config).await?;
        self.parse_timeline(target, &doc)
    }

    fn normalize_target(&self, input: &str) -> Result<String> {
        normalize_target(Platform::Weibo, input)
    }
}
