// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::config::RelayConfig;
use crate::http::HttpClient;
use crate::ingest::providers::{
    ultraman::{Listing, UltramanSource},
    x_api::XSource,
    youtube::YoutubeSource,
};
use crate::ingest::types::Source;

/// Longest title/summary we carry around; chat messages stay readable.
const MAX_TEXT_CHARS: usize = 500;

/// Normalize upstream text: decode HTML entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode (YouTube titles arrive as `&#39;` etc.)
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").expect("static regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 4) Length cap
    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

/// Build the configured sources in their fixed processing order:
/// X, YouTube, Ultraman News, Ultraman Column.
pub fn build_sources(cfg: &RelayConfig, http: &HttpClient) -> Vec<Box<dyn Source>> {
    let mut out: Vec<Box<dyn Source>> = Vec::new();
    let limit = cfg.fetch_limit;

    if let Some(x) = cfg.sources.x.as_ref().filter(|x| x.is_usable()) {
        out.push(Box::new(XSource::new(http.clone(), x, limit)));
        tracing::info!(username = ?x.username, "configured X/Twitter via API");
    } else if cfg.sources.x.is_some() {
        tracing::warn!("X enabled but bearer token or user id missing, skipping");
    }

    if let Some(yt) = cfg.sources.youtube.as_ref().filter(|y| y.is_usable()) {
        out.push(Box::new(YoutubeSource::new(http.clone(), yt, limit)));
        tracing::info!(channel = %yt.channel_id, "configured YouTube via API");
    } else if cfg.sources.youtube.is_some() {
        tracing::warn!("YouTube enabled but API key or channel id missing, skipping");
    }

    let cms = &cfg.sources.ultraman;
    if cms.news {
        out.push(Box::new(UltramanSource::new(http.clone(), cms, Listing::News, limit)));
        tracing::info!("configured Ultraman News via API");
    }
    if cms.column {
        out.push(Box::new(UltramanSource::new(http.clone(), cms, Listing::Column, limit)));
        tracing::info!("configured Ultraman Columns via API");
    }

    tracing::info!(total = out.len(), "sources configured");
    out
}
