// src/ingest/providers/x_api.rs
//! X (Twitter) API v2 user timeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::XConfig;
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::ingest::types::{CandidateItem, Source, SourceId};

/// The timeline endpoint rejects `max_results` below 5.
const MIN_MAX_RESULTS: usize = 5;

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

pub struct XSource {
    http: HttpClient,
    api_base: String,
    bearer_token: String,
    user_id: String,
    username: Option<String>,
    limit: usize,
}

impl XSource {
    pub fn new(http: HttpClient, cfg: &XConfig, limit: usize) -> Self {
        Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            bearer_token: cfg.bearer_token.clone(),
            user_id: cfg.user_id.clone(),
            username: cfg.username.clone().filter(|u| !u.is_empty()),
            limit: limit.max(1),
        }
    }

    fn tweet_url(&self, id: &str) -> String {
        match &self.username {
            Some(u) => format!("https://x.com/{u}/status/{id}"),
            None => format!("https://x.com/i/web/status/{id}"),
        }
    }
}

#[async_trait]
impl Source for XSource {
    fn id(&self) -> SourceId {
        SourceId::X
    }

    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, FetchError> {
        tracing::debug!(user_id = %self.user_id, "fetching tweets");
        let url = format!("{}/users/{}/tweets", self.api_base, self.user_id);
        let max_results = self.limit.max(MIN_MAX_RESULTS).to_string();

        let resp: TimelineResponse = self
            .http
            .get_json("x.timeline", |c| {
                c.get(&url)
                    .bearer_auth(&self.bearer_token)
                    .query(&[
                        ("max_results", max_results.as_str()),
                        ("tweet.fields", "created_at"),
                    ])
            })
            .await?;

        let items: Vec<CandidateItem> = resp
            .data
            .into_iter()
            .take(self.limit)
            .map(|t| {
                let url = self.tweet_url(&t.id);
                let mut item = CandidateItem::new(SourceId::X, t.id, url)
                    .with_published_at(t.created_at);
                if let Some(text) = t.text {
                    item = item.with_title(text);
                }
                item
            })
            .collect();

        if items.is_empty() {
            tracing::warn!(user_id = %self.user_id, "no tweets found");
        }
        Ok(items)
    }
}
