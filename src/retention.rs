// src/retention.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;

use crate::config::RelayConfig;
use crate::error::StoreError;
use crate::store::DedupStore;

/// Drops dedup history older than a fixed horizon so the store stays small.
#[derive(Debug, Clone, Copy)]
pub struct RetentionSweeper {
    horizon: ChronoDuration,
}

impl RetentionSweeper {
    /// Negative horizons are treated as zero (prune everything older than now).
    pub fn new(horizon: ChronoDuration) -> Self {
        Self {
            horizon: horizon.max(ChronoDuration::zero()),
        }
    }

    pub fn days(days: u32) -> Self {
        Self::new(ChronoDuration::days(i64::from(days)))
    }

    /// Sweeper for the configured horizon; rejects a zero-day horizon.
    pub fn from_config(cfg: &RelayConfig) -> anyhow::Result<Self> {
        cfg.validate_retention()?;
        Ok(Self::new(cfg.retention()))
    }

    pub fn horizon(&self) -> ChronoDuration {
        self.horizon
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.horizon
    }

    pub async fn sweep<S>(&self, store: &S, now: DateTime<Utc>) -> Result<u64, StoreError>
    where
        S: DedupStore + ?Sized,
    {
        let cutoff = self.cutoff(now);
        let removed = store.prune(cutoff).await?;
        counter!("relay_records_pruned_total").increment(removed);
        if removed > 0 {
            tracing::info!(removed, cutoff = %cutoff.to_rfc3339(), "pruned old dedup records");
        }
        Ok(removed)
    }
}

impl Default for RetentionSweeper {
    fn default() -> Self {
        Self::days(30)
    }
}
