// src/notify/discord.rs
//! Discord delivery over plain REST: bot-token channel posts and incoming webhooks.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use super::{Delivery, Destination};
use crate::config::DiscordConfig;
use crate::error::DeliveryError;
use crate::http::{truncate, HttpClient, MAX_ERROR_BODY};
use crate::ingest::types::CandidateItem;
use crate::retry::RetryPolicy;

const THREAD_NAME_MAX: usize = 100;
/// One day, in minutes.
const THREAD_AUTO_ARCHIVE: u32 = 1440;
/// GUILD_TEXT and GUILD_ANNOUNCEMENT.
const TEXT_CHANNEL_TYPES: [u8; 2] = [0, 5];

#[derive(Clone)]
pub struct DiscordDelivery {
    client: Client,
    retry: RetryPolicy,
    api_base: String,
    bot_token: Option<String>,
    channel_name: String,
    webhooks: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Guild {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct ThreadPayload<'a> {
    name: &'a str,
    auto_archive_duration: u32,
}

impl DiscordDelivery {
    pub fn new(http: &HttpClient, cfg: &DiscordConfig) -> Self {
        Self {
            client: http.client().clone(),
            retry: http.retry(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            bot_token: cfg.bot_token.clone().filter(|t| !t.trim().is_empty()),
            channel_name: cfg.channel_name.clone(),
            webhooks: cfg.webhook_urls.clone(),
        }
    }

    async fn call(
        &self,
        what: &str,
        target: &str,
        build: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<String, DeliveryError> {
        let client = &self.client;
        let build = &build;
        self.retry
            .run(what, move || async move {
                let resp = build(client).send().await?;
                let status = resp.status();
                let body = resp.text().await?;
                if status.is_success() {
                    return Ok(body);
                }
                Err(match status {
                    StatusCode::FORBIDDEN => DeliveryError::Forbidden(target.to_string()),
                    StatusCode::TOO_MANY_REQUESTS => DeliveryError::RateLimited,
                    _ => DeliveryError::Status {
                        status,
                        body: truncate(&body, MAX_ERROR_BODY),
                    },
                })
            })
            .await
    }

    fn authed(&self, rb: RequestBuilder, token: &str) -> RequestBuilder {
        rb.header(reqwest::header::AUTHORIZATION, format!("Bot {token}"))
    }

    async fn channels_named(&self, token: &str) -> Result<Vec<Destination>, DeliveryError> {
        let guilds_url = format!("{}/users/@me/guilds", self.api_base);
        let body = self
            .call("discord.guilds", "guild list", |c| self.authed(c.get(&guilds_url), token))
            .await?;
        let guilds: Vec<Guild> = parse(&body)?;

        let mut out = Vec::new();
        for g in guilds {
            let url = format!("{}/guilds/{}/channels", self.api_base, g.id);
            // One unreadable guild must not take the others down with it.
            let channels: Vec<Channel> = match self
                .call("discord.channels", &g.name, |c| self.authed(c.get(&url), token))
                .await
                .and_then(|body| parse(&body))
            {
                Ok(channels) => channels,
                Err(e) => {
                    tracing::warn!(guild = %g.name, error = %e, "cannot list guild channels, skipping guild");
                    continue;
                }
            };
            out.extend(
                channels
                    .into_iter()
                    .filter(|ch| TEXT_CHANNEL_TYPES.contains(&ch.kind))
                    .filter(|ch| ch.name.as_deref() == Some(self.channel_name.as_str()))
                    .map(|ch| Destination::Channel {
                        guild: g.name.clone(),
                        channel_id: ch.id,
                        name: self.channel_name.clone(),
                    }),
            );
        }
        Ok(out)
    }

    async fn post_to_channel(
        &self,
        token: &str,
        item: &CandidateItem,
        guild: &str,
        channel_id: &str,
    ) -> Result<(), DeliveryError> {
        let target = format!("{guild} #{}", self.channel_name);
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let body = self
            .call("discord.message", &target, |c| {
                self.authed(c.post(&url), token)
                    .json(&MessagePayload { content: &item.url })
            })
            .await?;
        let msg: Message = parse(&body)?;

        // The post already happened; a missing thread is not worth a repost.
        if let Err(e) = self.open_thread(token, item, channel_id, &msg.id).await {
            match e {
                DeliveryError::Forbidden(_) => tracing::error!(
                    guild,
                    "thread creation failed: enable 'Create Public Threads' for the bot role"
                ),
                other => tracing::error!(guild, error = %other, "thread creation failed"),
            }
        } else {
            tracing::info!(guild, "created discussion thread");
        }
        Ok(())
    }

    async fn open_thread(
        &self,
        token: &str,
        item: &CandidateItem,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), DeliveryError> {
        let name = thread_name(item);
        let url = format!(
            "{}/channels/{}/messages/{}/threads",
            self.api_base, channel_id, message_id
        );
        // Thread creation is best effort: one attempt, no retry.
        let resp = self
            .authed(self.client.post(&url), token)
            .json(&ThreadPayload {
                name: &name,
                auto_archive_duration: THREAD_AUTO_ARCHIVE,
            })
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::FORBIDDEN => Err(DeliveryError::Forbidden(channel_id.to_string())),
            status => Err(DeliveryError::Status {
                status,
                body: truncate(&resp.text().await.unwrap_or_default(), MAX_ERROR_BODY),
            }),
        }
    }

    async fn post_to_webhook(&self, item: &CandidateItem, label: &str, url: &str) -> Result<(), DeliveryError> {
        self.call("discord.webhook", label, |c| {
            c.post(url).json(&MessagePayload { content: &item.url })
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Delivery for DiscordDelivery {
    async fn resolve_destinations(&self) -> Result<Vec<Destination>, DeliveryError> {
        let mut out = Vec::new();
        if let Some(token) = &self.bot_token {
            let channels = self.channels_named(token).await?;
            if channels.is_empty() {
                tracing::warn!(
                    channel = %self.channel_name,
                    "no channels with this name found in any guild"
                );
            }
            out.extend(channels);
        }
        out.extend(
            self.webhooks
                .iter()
                .enumerate()
                .map(|(i, url)| Destination::Webhook {
                    label: format!("#{}", i + 1),
                    url: url.clone(),
                }),
        );
        Ok(out)
    }

    async fn deliver(&self, item: &CandidateItem, dest: &Destination) -> Result<(), DeliveryError> {
        match dest {
            Destination::Channel {
                guild, channel_id, ..
            } => {
                let token = self
                    .bot_token
                    .as_deref()
                    .ok_or_else(|| DeliveryError::Forbidden(format!("{guild}: no bot token")))?;
                self.post_to_channel(token, item, guild, channel_id).await
            }
            Destination::Webhook { label, url } => self.post_to_webhook(item, label, url).await,
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, DeliveryError> {
    serde_json::from_str(body).map_err(|e| DeliveryError::Parse(e.to_string()))
}

/// Thread title: the item title if there is one, else the URL; never empty.
fn thread_name(item: &CandidateItem) -> String {
    let base = item
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(&item.url);
    let name = truncate(base.trim(), THREAD_NAME_MAX);
    if name.is_empty() {
        "Discussion".to_string()
    } else {
        name
    }
}
