// src/ingest/providers/youtube.rs
//! YouTube Data API v3 channel search, newest first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::YoutubeConfig;
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::ingest::types::{CandidateItem, Source, SourceId};

/// Ask for a few results: the language marker filter drops some of them.
const MIN_RESULTS: usize = 3;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: VideoRef,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "publishedAt", default)]
    published_at: Option<DateTime<Utc>>,
}

pub struct YoutubeSource {
    http: HttpClient,
    api_base: String,
    api_key: String,
    channel_id: String,
    title_marker: Option<String>,
    limit: usize,
}

impl YoutubeSource {
    pub fn new(http: HttpClient, cfg: &YoutubeConfig, limit: usize) -> Self {
        Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            channel_id: cfg.channel_id.clone(),
            title_marker: cfg.title_marker.clone().filter(|m| !m.is_empty()),
            limit: limit.max(1),
        }
    }

    fn keeps(&self, title: &str) -> bool {
        match &self.title_marker {
            Some(m) => title.contains(m.as_str()),
            None => true,
        }
    }
}

#[async_trait]
impl Source for YoutubeSource {
    fn id(&self) -> SourceId {
        SourceId::Youtube
    }

    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, FetchError> {
        tracing::debug!(channel = %self.channel_id, "fetching latest videos");
        let url = format!("{}/search", self.api_base);
        let max_results = self.limit.max(MIN_RESULTS).to_string();

        let resp: SearchResponse = self
            .http
            .get_json("youtube.search", |c| {
                c.get(&url).query(&[
                    ("part", "snippet"),
                    ("channelId", self.channel_id.as_str()),
                    ("order", "date"),
                    ("type", "video"),
                    ("maxResults", max_results.as_str()),
                    ("key", self.api_key.as_str()),
                ])
            })
            .await
            .inspect_err(|e| {
                if matches!(e, FetchError::QuotaExceeded) {
                    tracing::error!(
                        "YouTube API quota exceeded; consider a longer POLL_INTERVAL_SECONDS"
                    );
                }
            })?;

        let items: Vec<CandidateItem> = resp
            .items
            .into_iter()
            .filter_map(|it| {
                let video_id = it.id.video_id?;
                let title = crate::ingest::normalize_text(&it.snippet.title);
                if !self.keeps(&title) {
                    return None;
                }
                let url = format!("https://www.youtube.com/watch?v={video_id}");
                let mut item = CandidateItem::new(SourceId::Youtube, video_id, url)
                    .with_title(title)
                    .with_published_at(it.snippet.published_at);
                if let Some(d) = it.snippet.description {
                    item = item.with_summary(d);
                }
                Some(item)
            })
            .take(self.limit)
            .collect();

        if items.is_empty() {
            tracing::warn!(channel = %self.channel_id, "no matching videos found");
        }
        Ok(items)
    }
}
