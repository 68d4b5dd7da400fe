// src/notify/mod.rs
pub mod discord;

use std::fmt;

use crate::error::DeliveryError;
use crate::ingest::types::CandidateItem;

/// One place an item gets posted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A guild text channel reached through the bot REST API.
    Channel {
        guild: String,
        channel_id: String,
        name: String,
    },
    /// An incoming webhook. `label` is safe to log, `url` is not.
    Webhook { label: String, url: String },
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Channel { guild, name, .. } => write!(f, "{guild} #{name}"),
            Destination::Webhook { label, .. } => write!(f, "webhook {label}"),
        }
    }
}

/// Capability the relay needs from the chat platform.
///
/// `deliver` may be called more than once for the same item across runs;
/// the relay guarantees "at least once", never "exactly once".
#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    /// Resolve the destination set for this run.
    async fn resolve_destinations(&self) -> Result<Vec<Destination>, DeliveryError>;

    async fn deliver(&self, item: &CandidateItem, dest: &Destination) -> Result<(), DeliveryError>;
}
