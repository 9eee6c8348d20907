//! Author-link validation. Admins may paste a profile URL instead of a
//! bare author id; this resolves it to the id stored on the task.

use crawlwatch_core::error::{CrawlWatchError, Result};
use crawlwatch_core::types::Platform;
use reqwest::Url;

/// Resolve user input to a target identifier for `platform`.
///
/// Plain ids are trimmed and kept. URLs must point at the platform's own
/// host and carry an author id.
pub fn normalize_target(platform: Platform, input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CrawlWatchError::InvalidTarget("target identifier is empty".into()));
    }
    if !(input.starts_with("http://") || input.starts_with("https://")) {
        return Ok(input.to_string());
    }

    let url = Url::parse(input)
        .map_err(|e| CrawlWatchError::InvalidTarget(format!("{input}: {e}")))?;
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if !host_matches(platform, &host) {
        return Err(CrawlWatchError::InvalidTarget(format!(
            "{input} is not a {platform} author link"
        )));
    }

    author_id_from_url(platform, &host, &url).ok_or_else(|| {
        CrawlWatchError::InvalidTarget(format!("no {platform} author id in {input}"))
    })
}

fn host_matches(platform: Platform, host: &str) -> bool {
    let suffixes: &[&str] = match platform {
        Platform::Douyin => &["douyin.com", "tiktok.com"],
        Platform::Xiaohongshu => &["xiaohongshu.com"],
        Platform::Kuaishou => &["kuaishou.com"],
        Platform::Bilibili => &["bilibili.com"],
        Platform::Weibo => &["weibo.com", "weibo.cn"],
    };
    suffixes
        .iter()
        .any(|s| host == *s || host.ends_with(&format!(".{s}")))
}

fn author_id_from_url(platform: Platform, host: &str, url: &Url) -> Option<String> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let id = match platform {
        Platform::Bilibili => {
            let mid = if host.starts_with("space.") {
                segments.first().copied()
            } else {
                segments
                    .iter()
                    .position(|s| *s == "space")
                    .and_then(|i| segments.get(i + 1).copied())
            };
            mid.filter(|id| id.chars().all(|c| c.is_ascii_digit()))
        }
        Platform::Weibo => match segments.as_slice() {
            ["u", id, ..] => Some(*id),
            [id, ..] => Some(*id),
            [] => None,
        },
        _ => segments.last().copied(),
    }?;

    Some(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_id_is_trimmed() {
        assert_eq!(normalize_target(Platform::Douyin, "  MS4wLj  ").unwrap(), "MS4wLj");
        assert!(normalize_target(Platform::Douyin, "   ").is_err());
    }

    #[test]
    fn test_profile_urls() {
        assert_eq!(
            normalize_target(Platform::Douyin, "https://www.douyin.com/user/MS4wLjABAAAA?from=tab")
                .unwrap(),
            "MS4wLjABAAAA"
        );
        assert_eq!(
            normalize_target(
                Platform::Xiaohongshu,
                "https://www.xiaohongshu.com/user/profile/5f1e2d3c4b5a6978"
            )
            .unwrap(),
            "5f1e2d3c4b5a6978"
        );
        assert_eq!(
            normalize_target(Platform::Bilibili, "https://space.bilibili.com/2267573/video").unwrap(),
            "2267573"
        );
        assert_eq!(
            normalize_target(Platform::Bilibili, "https://www.bilibili.com/space/946974").unwrap(),
            "946974"
        );
        assert_eq!(
            normalize_target(Platform::Weibo, "https://weibo.com/u/1669879400").unwrap(),
            "1669879400"
        );
        assert_eq!(
            normalize_target(Platform::Weibo, "https://weibo.com/someone").unwrap(),
            "someone"
        );
    }

    #[test]
    fn test_foreign_host_rejected() {
        let err = normalize_target(Platform::Kuaishou, "https://www.douyin.com/user/abc").unwrap_err();
        assert!(matches!(err, CrawlWatchError::InvalidTarget(_)));
        // lookalike suffix
        assert!(normalize_target(Platform::Weibo, "https://notweibo.com/u/1").is_err());
    }

    #[test]
    fn test_bilibili_requires_numeric_mid() {
        assert!(normalize_target(Platform::Bilibili, "https://www.bilibili.com/video/BV1xx").is_err());
    }
}
