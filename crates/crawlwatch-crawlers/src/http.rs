//! Shared HTTP plumbing for adapters: a configured client, cookie
//! forwarding from task config, and link-id extraction.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use crawlwatch_core::config::CrawlerConfig;
use crawlwatch_core::error::{CrawlWatchError, Result};
use crawlwatch_core::types::{Engagement, MediaKind, Platform, TaskConfig, Work};
use regex::Regex;

/// HTTP client shared by one adapter.
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| CrawlWatchError::Http(format!("Client error: {e}")))?;
        Ok(Self { client })
    }

    /// GET a page, forwarding the task's cookies. Non-2xx is an error.
    pub async fn get_text(&self, url: &str, config: &TaskConfig) -> Result<String> {
        let resp = self.request(url, config).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CrawlWatchError::Crawl(format!("GET {url} returned {status}")));
        }
        Ok(resp.text().await?)
    }

    /// GET a JSON document, forwarding the task's cookies.
    pub async fn get_json(&self, url: &str, config: &TaskConfig) -> Result<serde_json::Value> {
        let resp = self.request(url, config).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CrawlWatchError::Crawl(format!("GET {url} returned {status}")));
        }
        Ok(resp.json().await?)
    }

    fn request(&self, url: &str, config: &TaskConfig) -> reqwest::RequestBuilder {
        let req = self.client.get(url);
        match cookie_header(config) {
            Some(cookie) => req.header(reqwest::header::COOKIE, cookie),
            None => req,
        }
    }
}

/// Build a `Cookie:` header from `config.cookies`.
///
/// Accepts a raw header string, a `{name: value}` map, or a list of
/// `{name, value}` objects (browser export format).
pub fn cookie_header(config: &TaskConfig) -> Option<String> {
    let cookies = config.get("cookies")?;
    let header = match cookies {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| format!("{k}={v}")))
            .collect::<Vec<_>>()
            .join("; "),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|c| Some(format!("{}={}", c["name"].as_str()?, c["value"].as_str()?)))
            .collect::<Vec<_>>()
            .join("; "),
        _ => String::new(),
    };
    if header.is_empty() { None } else { Some(header) }
}

pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| CrawlWatchError::Config(format!("bad pattern {pattern}: {e}")))
}

/// First capture group of every match, first occurrence wins.
pub fn collect_ids(re: &Regex, body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    re.captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Minimal work record for an item known only by its link.
pub(crate) fn work_from_link(
    platform: Platform,
    author: &str,
    raw_id: &str,
    media_kind: MediaKind,
    source_url: String,
) -> Work {
    Work {
        platform,
        content_id: format!("{}_{}", platform.as_str(), raw_id),
        title: format!("{author} · {raw_id}"),
        author: author.to_string(),
        description: String::new(),
        media_kind,
        cover_url: String::new(),
        media_url: source_url.clone(),
        source_url,
        created_at: Some(Utc::now()),
        engagement: Engagement::default(),
    }
}
