// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod relay;
pub mod retention;
pub mod retry;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::RelayConfig;
pub use crate::error::{DeliveryError, FetchError, StoreError};
pub use crate::ingest::types::{CandidateItem, Source, SourceId};
pub use crate::notify::{discord::DiscordDelivery, Delivery, Destination};
pub use crate::relay::{Relay, RunSummary};
pub use crate::retention::RetentionSweeper;
pub use crate::store::{DedupStore, SqliteStore};
