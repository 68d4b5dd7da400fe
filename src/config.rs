// src/config.rs
//! Relay configuration: TOML file as the base layer, environment variables on top.
//!
//! Resolution order for the file:
//! 1) explicit `--config` path
//! 2) `$RELAY_CONFIG_PATH`
//! 3) `config/relay.toml` if present
//! 4) built-in defaults
//!
//! Environment names match the existing deployment's `.env` files
//! (`DISCORD_BOT_TOKEN`, `CHANNEL_NAME`, `DATABASE_PATH`, ...).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_X_API_BASE: &str = "https://api.x.com/2";
pub const DEFAULT_YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_ULTRAMAN_API_BASE: &str = "https://api.ultraman-cardgame.com/api/v1/us";
pub const DEFAULT_ULTRAMAN_SITE_BASE: &str = "https://ultraman-cardgame.com/page/us";

const MIN_POLL_INTERVAL_SECS: u64 = 60;
const MAX_FETCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub database_path: PathBuf,
    /// Dedup records older than this are pruned at the end of every run.
    pub retention_days: u32,
    /// Spacing between runs in `watch` mode.
    pub poll_interval_secs: u64,
    /// How many of the freshest items each source returns per run.
    pub fetch_limit: usize,
    pub log_level: String,
    pub log_format: LogFormat,
    /// When set, the Prometheus exposition is written here after each run.
    pub metrics_textfile: Option<PathBuf>,
    pub http: HttpSettings,
    pub discord: DiscordConfig,
    pub sources: SourcesConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./bot_data.db"),
            retention_days: 30,
            poll_interval_secs: 300,
            fetch_limit: 1,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            metrics_textfile: None,
            http: HttpSettings::default(),
            discord: DiscordConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry_max_attempts: 3,
            retry_initial_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub bot_token: Option<String>,
    /// Every text channel with this name, in every joined guild, is a destination.
    pub channel_name: String,
    pub webhook_urls: Vec<String>,
    pub api_base: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel_name: "ucg-news-bot".to_string(),
            webhook_urls: Vec::new(),
            api_base: DEFAULT_DISCORD_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SourcesConfig {
    pub x: Option<XConfig>,
    pub youtube: Option<YoutubeConfig>,
    pub ultraman: UltramanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XConfig {
    pub bearer_token: String,
    pub user_id: String,
    pub username: Option<String>,
    pub api_base: String,
}

impl Default for XConfig {
    fn default() -> Self {
        Self {
            bearer_token: String::new(),
            user_id: String::new(),
            username: None,
            api_base: DEFAULT_X_API_BASE.to_string(),
        }
    }
}

impl XConfig {
    pub fn is_usable(&self) -> bool {
        !self.bearer_token.trim().is_empty() && !self.user_id.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    pub api_key: String,
    pub channel_id: String,
    /// Only videos whose title contains this marker are relayed.
    pub title_marker: Option<String>,
    pub api_base: String,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            channel_id: String::new(),
            title_marker: Some("[EN]".to_string()),
            api_base: DEFAULT_YOUTUBE_API_BASE.to_string(),
        }
    }
}

impl YoutubeConfig {
    pub fn is_usable(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.channel_id.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UltramanConfig {
    pub news: bool,
    pub column: bool,
    pub api_base: String,
    pub site_base: String,
}

impl Default for UltramanConfig {
    fn default() -> Self {
        Self {
            news: false,
            column: false,
            api_base: DEFAULT_ULTRAMAN_API_BASE.to_string(),
            site_base: DEFAULT_ULTRAMAN_SITE_BASE.to_string(),
        }
    }
}

impl RelayConfig {
    /// Load file + process environment. Does not validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = match resolve_config_path(explicit)? {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading relay config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Overlay environment variables. `get` is injected so tests can use a map.
    pub fn apply_env<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("DISCORD_BOT_TOKEN") {
            self.discord.bot_token = Some(v);
        }
        if let Some(v) = get("CHANNEL_NAME") {
            self.discord.channel_name = v;
        }
        if let Some(v) = get("DISCORD_WEBHOOK_URLS") {
            self.discord.webhook_urls = split_list(&v);
        }
        if let Some(v) = get("DISCORD_API_BASE") {
            self.discord.api_base = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("POLL_INTERVAL_SECONDS") {
            self.poll_interval_secs = parse_num("POLL_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = get("RETENTION_DAYS") {
            self.retention_days = parse_num("RETENTION_DAYS", &v)?;
        }
        if let Some(v) = get("FETCH_LIMIT") {
            self.fetch_limit = parse_num("FETCH_LIMIT", &v)?;
        }
        if let Some(v) = get("HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = parse_num("HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("RETRY_MAX_ATTEMPTS") {
            self.http.retry_max_attempts = parse_num("RETRY_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("RETRY_INITIAL_DELAY_MS") {
            self.http.retry_initial_delay_ms = parse_num("RETRY_INITIAL_DELAY_MS", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v.to_ascii_lowercase();
        }
        if let Some(v) = get("LOG_FORMAT") {
            self.log_format = match v.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" | "text" | "pretty" => LogFormat::Compact,
                other => bail!("LOG_FORMAT must be `json` or `compact`, got `{other}`"),
            };
        }
        if let Some(v) = get("METRICS_TEXTFILE") {
            self.metrics_textfile = Some(PathBuf::from(v));
        }

        // X is enabled by any of its variables; validation reports what is missing.
        let (username, bearer, user_id) = (
            get("TWITTER_USERNAME"),
            get("X_API_BEARER"),
            get("UCG_EN_X_ID"),
        );
        if username.is_some() || bearer.is_some() || user_id.is_some() {
            let x = self.sources.x.get_or_insert_with(XConfig::default);
            if username.is_some() {
                x.username = username;
            }
            if let Some(v) = bearer {
                x.bearer_token = v;
            }
            if let Some(v) = user_id {
                x.user_id = v;
            }
        }
        if let Some(v) = get("X_API_BASE") {
            if let Some(x) = self.sources.x.as_mut() {
                x.api_base = v;
            }
        }

        let (yt_channel, yt_key) = (get("YOUTUBE_CHANNEL_ID"), get("YOUTUBE_API_KEY"));
        if yt_channel.is_some() || yt_key.is_some() {
            let yt = self.sources.youtube.get_or_insert_with(YoutubeConfig::default);
            if let Some(v) = yt_channel {
                yt.channel_id = v;
            }
            if let Some(v) = yt_key {
                yt.api_key = v;
            }
        }
        if let Some(yt) = self.sources.youtube.as_mut() {
            if let Some(v) = get("YOUTUBE_TITLE_MARKER") {
                yt.title_marker = Some(v);
            }
            if let Some(v) = get("YOUTUBE_API_BASE") {
                yt.api_base = v;
            }
        }

        // Existing deployments set these as on/off switches; the value is not a URL we call.
        if get("ULTRAMAN_NEWS_URL").is_some() {
            self.sources.ultraman.news = true;
        }
        if get("ULTRAMAN_COLUMN_URL").is_some() {
            self.sources.ultraman.column = true;
        }
        if let Some(v) = get("ULTRAMAN_API_BASE") {
            self.sources.ultraman.api_base = v;
        }

        Ok(())
    }

    /// Collect every configuration problem into one error.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        let has_bot = self
            .discord
            .bot_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if !has_bot && self.discord.webhook_urls.is_empty() {
            errors.push("DISCORD_BOT_TOKEN (or at least one DISCORD_WEBHOOK_URLS entry) is required".into());
        }
        if has_bot && self.discord.channel_name.trim().is_empty() {
            errors.push("CHANNEL_NAME must not be empty".into());
        }
        if let Some(x) = &self.sources.x {
            if !x.is_usable() {
                errors.push("X_API_BEARER and UCG_EN_X_ID are required when X/Twitter is enabled".into());
            }
        }
        if let Some(yt) = &self.sources.youtube {
            if !yt.is_usable() {
                errors.push("YOUTUBE_API_KEY and YOUTUBE_CHANNEL_ID are required when YouTube is enabled".into());
            }
        }
        if !self.has_source() {
            errors.push(
                "At least one source must be configured (TWITTER_USERNAME, YOUTUBE_CHANNEL_ID, ULTRAMAN_NEWS_URL or ULTRAMAN_COLUMN_URL)".into(),
            );
        }
        if self.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            errors.push(format!(
                "POLL_INTERVAL_SECONDS must be at least {MIN_POLL_INTERVAL_SECS} seconds"
            ));
        }
        if !(1..=MAX_FETCH_LIMIT).contains(&self.fetch_limit) {
            errors.push(format!("FETCH_LIMIT must be between 1 and {MAX_FETCH_LIMIT}"));
        }
        if let Err(e) = self.validate_retention() {
            errors.push(e.to_string());
        }
        if self.http.retry_max_attempts == 0 {
            errors.push("RETRY_MAX_ATTEMPTS must be at least 1".into());
        }

        if errors.is_empty() {
            return Ok(());
        }
        let lines: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
        Err(anyhow!("Configuration validation failed:\n{}", lines.join("\n")))
    }

    /// The only check `prune` needs. A zero horizon would delete every record
    /// and the next run would repost everything still listed upstream.
    pub fn validate_retention(&self) -> Result<()> {
        if self.retention_days == 0 {
            bail!("RETENTION_DAYS must be at least 1");
        }
        Ok(())
    }

    pub fn has_source(&self) -> bool {
        self.sources.x.is_some()
            || self.sources.youtube.is_some()
            || self.sources.ultraman.news
            || self.sources.ultraman.column
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_attempts(self.http.retry_max_attempts)
            .with_initial_delay(Duration::from_millis(self.http.retry_initial_delay_ms))
    }

    /// Key/value view for startup logs. Secrets are replaced by a short fingerprint.
    pub fn redacted_summary(&self) -> Vec<(&'static str, String)> {
        let secret = |s: Option<&str>| match s {
            Some(v) if !v.is_empty() => format!("set (sha256:{})", fingerprint(v)),
            _ => "unset".to_string(),
        };
        let x = self.sources.x.as_ref();
        let yt = self.sources.youtube.as_ref();
        vec![
            ("DISCORD_BOT_TOKEN", secret(self.discord.bot_token.as_deref())),
            ("CHANNEL_NAME", self.discord.channel_name.clone()),
            ("DISCORD_WEBHOOK_URLS", format!("{} configured", self.discord.webhook_urls.len())),
            ("X_API_BEARER", secret(x.map(|x| x.bearer_token.as_str()))),
            ("UCG_EN_X_ID", x.map(|x| x.user_id.clone()).unwrap_or_default()),
            ("TWITTER_USERNAME", x.and_then(|x| x.username.clone()).unwrap_or_default()),
            ("YOUTUBE_API_KEY", secret(yt.map(|y| y.api_key.as_str()))),
            ("YOUTUBE_CHANNEL_ID", yt.map(|y| y.channel_id.clone()).unwrap_or_default()),
            ("ULTRAMAN_NEWS", self.sources.ultraman.news.to_string()),
            ("ULTRAMAN_COLUMN", self.sources.ultraman.column.to_string()),
            ("POLL_INTERVAL_SECONDS", self.poll_interval_secs.to_string()),
            ("RETENTION_DAYS", self.retention_days.to_string()),
            ("FETCH_LIMIT", self.fetch_limit.to_string()),
            ("LOG_LEVEL", self.log_level.clone()),
            ("DATABASE_PATH", self.database_path.display().to_string()),
        ]
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(p) = explicit {
        return Ok(Some(p.to_path_buf()));
    }
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    Ok(default.exists().then_some(default))
}

fn parse_num<T: std::str::FromStr>(name: &str, v: &str) -> Result<T> {
    v.parse::<T>()
        .map_err(|_| anyhow!("{name} must be a non-negative integer, got `{v}`"))
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// First 6 bytes of SHA-256, hex encoded. Enough to tell two secrets apart in logs.
fn fingerprint(secret: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(secret.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn env_enables_sources_and_overrides_defaults() {
        let mut cfg = RelayConfig::default();
        cfg.apply_env(env_of(&[
            ("DISCORD_BOT_TOKEN", "tok"),
            ("TWITTER_USERNAME", "ucg_en"),
            ("X_API_BEARER", "bearer"),
            ("UCG_EN_X_ID", "123"),
            ("ULTRAMAN_NEWS_URL", "https://ultraman-cardgame.com/page/us/news"),
            ("POLL_INTERVAL_SECONDS", "900"),
            ("DISCORD_WEBHOOK_URLS", " https://a , ,https://b "),
        ]))
        .unwrap();

        assert_eq!(cfg.poll_interval_secs, 900);
        assert!(cfg.sources.ultraman.news);
        assert!(!cfg.sources.ultraman.column);
        assert_eq!(cfg.sources.x.as_ref().unwrap().user_id, "123");
        assert_eq!(cfg.discord.webhook_urls, vec!["https://a", "https://b"]);
        cfg.validate().unwrap();
    }

    #[test]
    fn validation_reports_every_problem() {
        let mut cfg = RelayConfig::default();
        cfg.apply_env(env_of(&[
            ("TWITTER_USERNAME", "ucg_en"),
            ("POLL_INTERVAL_SECONDS", "30"),
        ]))
        .unwrap();
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("DISCORD_BOT_TOKEN"), "{msg}");
        assert!(msg.contains("X_API_BEARER"), "{msg}");
        assert!(msg.contains("POLL_INTERVAL_SECONDS"), "{msg}");
        assert!(!msg.contains("At least one source"), "{msg}");
    }

    #[test]
    fn zero_retention_is_rejected_on_its_own_and_in_full_validation() {
        let mut cfg = RelayConfig::default();
        cfg.apply_env(env_of(&[
            ("DISCORD_BOT_TOKEN", "tok"),
            ("ULTRAMAN_NEWS_URL", "https://ultraman-cardgame.com/page/us/news"),
            ("RETENTION_DAYS", "0"),
        ]))
        .unwrap();

        let err = cfg.validate_retention().unwrap_err().to_string();
        assert!(err.contains("RETENTION_DAYS"), "{err}");
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("RETENTION_DAYS"), "{msg}");

        cfg.retention_days = 1;
        cfg.validate_retention().unwrap();
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let mut cfg = RelayConfig::default();
        let err = cfg
            .apply_env(env_of(&[("FETCH_LIMIT", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("FETCH_LIMIT"));
    }

    #[test]
    fn toml_file_layer_parses() {
        let cfg = RelayConfig::from_toml_str(
            r#"
            retention_days = 14
            fetch_limit = 3

            [discord]
            bot_token = "tok"
            channel_name = "news"

            [sources.youtube]
            api_key = "k"
            channel_id = "UC123"

            [sources.ultraman]
            column = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.retention_days, 14);
        assert_eq!(cfg.discord.channel_name, "news");
        let yt = cfg.sources.youtube.as_ref().unwrap();
        assert_eq!(yt.title_marker.as_deref(), Some("[EN]"));
        assert_eq!(yt.api_base, DEFAULT_YOUTUBE_API_BASE);
        assert!(cfg.sources.ultraman.column);
        cfg.validate().unwrap();
    }

    #[test]
    fn summary_never_contains_secrets() {
        let mut cfg = RelayConfig::default();
        cfg.discord.bot_token = Some("super-secret-token".into());
        let joined = cfg
            .redacted_summary()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        assert!(!joined.contains("super-secret-token"));
        assert!(joined.contains("DISCORD_BOT_TOKEN=set (sha256:"));
    }
}
