// src/ingest/types.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::FetchError;

/// The fixed set of sources the relay knows how to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    X,
    Youtube,
    UltramanNews,
    UltramanColumn,
}

impl SourceId {
    /// Stable identifier, used as the store namespace. Never change these.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::X => "x",
            SourceId::Youtube => "youtube",
            SourceId::UltramanNews => "ultraman_news",
            SourceId::UltramanColumn => "ultraman_column",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SourceId::X => "X/Twitter",
            SourceId::Youtube => "YouTube",
            SourceId::UltramanNews => "Ultraman News",
            SourceId::UltramanColumn => "Ultraman Columns",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" | "twitter" => Ok(SourceId::X),
            "youtube" => Ok(SourceId::Youtube),
            "ultraman_news" | "news" => Ok(SourceId::UltramanNews),
            "ultraman_column" | "column" => Ok(SourceId::UltramanColumn),
            other => Err(format!("unknown source id: {other}")),
        }
    }
}

/// One piece of content seen on a source during a run, before dedup.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CandidateItem {
    pub source_id: SourceId,
    /// Unique within `source_id` and stable across runs.
    pub key: String,
    pub url: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl CandidateItem {
    pub fn new(source_id: SourceId, key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source_id,
            key: key.into(),
            url: url.into(),
            title: None,
            summary: None,
            published_at: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let t = crate::ingest::normalize_text(&title.into());
        self.title = (!t.is_empty()).then_some(t);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        let s = crate::ingest::normalize_text(&summary.into());
        self.summary = (!s.is_empty()).then_some(s);
        self
    }

    pub fn with_published_at(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.published_at = ts;
        self
    }
}

/// Capability every content source implements.
///
/// Returns a finite, freshest-first batch. A failure only affects this
/// source for the current run.
#[async_trait::async_trait]
pub trait Source: Send + Sync {
    fn id(&self) -> SourceId;

    fn name(&self) -> &'static str {
        self.id().display_name()
    }

    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ids_round_trip_through_str() {
        for id in [
            SourceId::X,
            SourceId::Youtube,
            SourceId::UltramanNews,
            SourceId::UltramanColumn,
        ] {
            assert_eq!(id.as_str().parse::<SourceId>().unwrap(), id);
        }
        assert!("facebook".parse::<SourceId>().is_err());
    }

    #[test]
    fn empty_title_becomes_none() {
        let it = CandidateItem::new(SourceId::X, "1", "https://x.com/i/web/status/1").with_title("   ");
        assert_eq!(it.title, None);
    }
}
