// src/ingest/providers/ultraman.rs
//! Ultraman Card Game CMS listings (news and columns share one API shape).

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::UltramanConfig;
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::ingest::types::{CandidateItem, Source, SourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    News,
    Column,
}

impl Listing {
    fn endpoint(self) -> &'static str {
        match self {
            Listing::News => "news",
            Listing::Column => "column",
        }
    }

    fn per_page(self) -> &'static str {
        match self {
            Listing::News => "18",
            Listing::Column => "20",
        }
    }

    fn detail_path(self) -> &'static str {
        match self {
            Listing::News => "news/news-detail",
            Listing::Column => "column/column-detail",
        }
    }

    fn source_id(self) -> SourceId {
        match self {
            Listing::News => SourceId::UltramanNews,
            Listing::Column => SourceId::UltramanColumn,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(default)]
    data: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    id: serde_json::Value,
    #[serde(default)]
    title: Option<String>,
    /// Sic: the CMS spells "pinned" this way.
    #[serde(default)]
    pined: bool,
}

impl Article {
    /// Ids come back as numbers today; accept strings too.
    fn key(&self) -> Option<String> {
        match &self.id {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

pub struct UltramanSource {
    http: HttpClient,
    listing: Listing,
    api_base: String,
    site_base: String,
    limit: usize,
}

impl UltramanSource {
    pub fn new(http: HttpClient, cfg: &UltramanConfig, listing: Listing, limit: usize) -> Self {
        Self {
            http,
            listing,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            site_base: cfg.site_base.trim_end_matches('/').to_string(),
            limit: limit.max(1),
        }
    }
}

#[async_trait]
impl Source for UltramanSource {
    fn id(&self) -> SourceId {
        self.listing.source_id()
    }

    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, FetchError> {
        let url = format!("{}/{}", self.api_base, self.listing.endpoint());
        let what = match self.listing {
            Listing::News => "ultraman.news",
            Listing::Column => "ultraman.column",
        };

        let resp: ListingResponse = self
            .http
            .get_json(what, |c| {
                c.get(&url)
                    .query(&[("page", "1"), ("per_page", self.listing.per_page())])
            })
            .await?;

        let source_id = self.id();
        let items: Vec<CandidateItem> = resp
            .data
            .into_iter()
            // Pinned news stays on top for weeks; it is never "latest".
            .filter(|a| !(self.listing == Listing::News && a.pined))
            .filter_map(|a| {
                let key = a.key()?;
                let url = format!("{}/{}/{}", self.site_base, self.listing.detail_path(), key);
                let mut item = CandidateItem::new(source_id, key, url);
                if let Some(t) = a.title {
                    item = item.with_title(t);
                }
                Some(item)
            })
            .take(self.limit)
            .collect();

        if items.is_empty() {
            tracing::warn!(source = %source_id, "no articles found in listing");
        }
        Ok(items)
    }
}
