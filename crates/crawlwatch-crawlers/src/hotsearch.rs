//! Trending-list sources for the hotsearch system job.
//!
//! Only platforms exposing a JSON endpoint get a source; the rest are
//! skipped by the job.

use std::sync::Arc;

use async_trait::async_trait;
use crawlwatch_core::config::CrawlerConfig;
use crawlwatch_core::error::{CrawlWatchError, Result};
use crawlwatch_core::traits::HotsearchSource;
use crawlwatch_core::types::{HotItem, Platform, TaskConfig};
use serde_json::Value;

use crate::http::PageFetcher;

type ParseFn = fn(&Value, usize) -> Result<Vec<HotItem>>;

/// A trending list served as JSON.
pub struct ApiHotsearch {
    platform: Platform,
    endpoint: &'static str,
    parse: ParseFn,
    fetcher: PageFetcher,
}

impl ApiHotsearch {
    pub fn weibo(config: &CrawlerConfig) -> Result<Self> {
        Self::new(Platform::Weibo, "https://weibo.com/ajax/side/hotSearch", parse_weibo, config)
    }

    pub fn bilibili(config: &CrawlerConfig) -> Result<Self> {
        Self::new(
            Platform::Bilibili,
            "https://api.bilibili.com/x/web-interface/search/square?limit=50",
            parse_bilibili,
            config,
        )
    }

    pub fn douyin(config: &CrawlerConfig) -> Result<Self> {
        Self::new(
            Platform::Douyin,
            "https://www.douyin.com/aweme/v1/web/hot/search/list/",
            parse_douyin,
            config,
        )
    }

    fn new(
        platform: Platform,
        endpoint: &'static str,
        parse: ParseFn,
        config: &CrawlerConfig,
    ) -> Result<Self> {
        Ok(Self {
            platform,
            endpoint,
            parse,
            fetcher: PageFetcher::new(config)?,
        })
    }
}

#[async_trait]
impl HotsearchSource for ApiHotsearch {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch_hot(&self, limit: usize) -> Result<Vec<HotItem>> {
        let doc = self.fetcher.get_json(self.endpoint, &TaskConfig::new()).await?;
        (self.parse)(&doc, limit)
    }
}

/// Sources for every configured platform that has one.
pub fn default_hotsearch_sources(config: &CrawlerConfig) -> Result<Vec<Arc<dyn HotsearchSource>>> {
    let mut sources: Vec<Arc<dyn HotsearchSource>> = Vec::new();
    for platform in &config.hotsearch_platforms {
        let source = match platform {
            Platform::Weibo => ApiHotsearch::weibo(config)?,
            Platform::Bilibili => ApiHotsearch::bilibili(config)?,
            Platform::Douyin => ApiHotsearch::douyin(config)?,
            other => {
                tracing::debug!("No hotsearch source for {other}");
                continue;
            }
        };
        sources.push(Arc::new(source));
    }
    Ok(sources)
}

fn search_url(base: &str, param: &str, keyword: &str) -> String {
    reqwest::Url::parse_with_params(base, &[(param, keyword)])
        .map(|u| u.to_string())
        .unwrap_or_else(|_| base.to_string())
}

fn items(list: Option<&Vec<Value>>, what: &str) -> Result<Vec<Value>> {
    list.cloned()
        .ok_or_else(|| CrawlWatchError::Crawl(format!("{what}: unexpected response shape")))
}

pub fn parse_weibo(doc: &Value, limit: usize) -> Result<Vec<HotItem>> {
    let list = items(doc["data"]["realtime"].as_array(), "weibo hotsearch")?;
    Ok(list
        .iter()
        .filter(|it| it["is_ad"].as_i64().unwrap_or(0) == 0)
        .filter_map(|it| it["word"].as_str().map(|w| (w, it["num"].as_u64().unwrap_or(0))))
        .take(limit)
        .enumerate()
        .map(|(i, (word, heat))| HotItem {
            rank: i as u32 + 1,
            keyword: word.to_string(),
            heat,
            url: search_url("https://s.weibo.com/weibo", "q", &format!("#{word}#")),
        })
        .collect())
}

pub fn parse_bilibili(doc: &Value, limit: usize) -> Result<Vec<HotItem>> {
    if doc["code"].as_i64() != Some(0) {
        return Err(CrawlWatchError::Crawl(format!(
            "bilibili hotsearch: code {}",
            doc["code"]
        )));
    }
    let data = &doc["data"];
    let list = items(
        data["trending"]["list"].as_array().or_else(|| data["list"].as_array()),
        "bilibili hotsearch",
    )?;
    Ok(list
        .iter()
        .filter_map(|it| {
            let word = it["show_name"].as_str().or_else(|| it["keyword"].as_str())?;
            Some((word, it["hot_value"].as_u64().or_else(|| it["heat_score"].as_u64()).unwrap_or(0)))
        })
        .take(limit)
        .enumerate()
        .map(|(i, (word, heat))| HotItem {
            rank: i as u32 + 1,
            keyword: word.to_string(),
            heat,
            url: search_url("https://search.bilibili.com/all", "keyword", word),
        })
        .collect())
}

pub fn parse_douyin(doc: &Value, limit: usize) -> Result<Vec<HotItem>> {
    let list = items(doc["data"]["word_list"].as_array(), "douyin hotsearch")?;
    Ok(list
        .iter()
        .filter_map(|it| it["word"].as_str().map(|w| (w, it["hot_value"].as_u64().unwrap_or(0))))
        .take(limit)
        .enumerate()
        .map(|(i, (word, heat))| HotItem {
            rank: i as u32 + 1,
            keyword: word.to_string(),
            heat,
            url: search_url("https://www.douyin.com/search", "q", word),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weibo_skips_ads_and_limits() {
        let doc = serde_json::json!({"data": {"realtime": [
            {"word": "a", "num": 100},
            {"word": "ad", "num": 5, "is_ad": 1},
            {"word": "b", "num": 50},
            {"word": "c", "num": 10}
        ]}});
        let items = parse_weibo(&doc, 2).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].keyword, "b");
        assert_eq!(items[1].rank, 2);
        assert!(items[0].url.starts_with("https://s.weibo.com/weibo?q="));
    }

    #[test]
    fn test_parse_bilibili_both_shapes() {
        let square = serde_json::json!({"code": 0, "data": {"trending": {"list": [
            {"keyword": "k1", "show_name": "Show 1", "heat_score": 9}
        ]}}});
        let items = parse_bilibili(&square, 20).unwrap();
        assert_eq!(items[0].keyword, "Show 1");
        assert_eq!(items[0].heat, 9);
        assert!(items[0].url.contains("keyword="));

        let rcmd = serde_json::json!({"code": 0, "data": {"list": [{"keyword": "k2", "hot_value": 3}]}});
        assert_eq!(parse_bilibili(&rcmd, 20).unwrap()[0].keyword, "k2");

        assert!(parse_bilibili(&serde_json::json!({"code": -412}), 20).is_err());
    }

    #[test]
    fn test_parse_douyin_shape_error() {
        assert!(parse_douyin(&serde_json::json!({"data": {}}), 20).is_err());
        let doc = serde_json::json!({"data": {"word_list": [{"word": "w", "hot_value": 1}]}});
        assert_eq!(parse_douyin(&doc, 20).unwrap()[0].heat, 1);
    }

    #[test]
    fn test_default_sources_follow_config() {
        let config = CrawlerConfig {
            hotsearch_platforms: vec![Platform::Weibo, Platform::Kuaishou],
            ..CrawlerConfig::default()
        };
        let sources = default_hotsearch_sources(&config).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].platform(), Platform::Weibo);
    }
}
