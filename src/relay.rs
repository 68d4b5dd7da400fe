// src/relay.rs
//! # Relay engine
//! One linear pass per invocation:
//! fetch (per source, fixed order) → drop already-delivered → deliver to every
//! destination → commit immediately → prune at the end.
//!
//! Commit granularity is one item. A crash can therefore repost at most the
//! single item that was in flight, and never loses one that was not recorded.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;

use crate::error::DeliveryError;
use crate::ingest::types::{CandidateItem, Source, SourceId};
use crate::metrics::ensure_metrics_described;
use crate::notify::{Delivery, Destination};
use crate::retention::RetentionSweeper;
use crate::store::DedupStore;

/// Counts for one run, reported to logs and to the exit code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub fetched: u64,
    pub skipped: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Delivered but not recorded; these will be posted again next run.
    pub uncommitted: u64,
    pub source_errors: u64,
    pub pruned: u64,
}

impl RunSummary {
    /// True on any item-level failure.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.uncommitted > 0
    }
}

pub struct Relay<S, D> {
    sources: Vec<Box<dyn Source>>,
    store: S,
    delivery: D,
    sweeper: RetentionSweeper,
}

impl<S, D> Relay<S, D>
where
    S: DedupStore,
    D: Delivery,
{
    /// `sources` are processed in the given order.
    pub fn new(sources: Vec<Box<dyn Source>>, store: S, delivery: D) -> Self {
        Self {
            sources,
            store,
            delivery,
            sweeper: RetentionSweeper::default(),
        }
    }

    pub fn with_retention(mut self, sweeper: RetentionSweeper) -> Self {
        self.sweeper = sweeper;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn delivery(&self) -> &D {
        &self.delivery
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    /// Close the store; the relay is done after this.
    pub async fn shutdown(self) {
        self.store.close().await;
    }

    pub async fn run_once(&self) -> RunSummary {
        self.run_once_at(Utc::now()).await
    }

    /// Same as [`run_once`](Self::run_once) with an explicit clock, used for
    /// commit timestamps and the retention cutoff.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> RunSummary {
        ensure_metrics_described();
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut handled: HashSet<(SourceId, String)> = HashSet::new();
        // Resolved lazily: a run with nothing new never talks to the chat API.
        let mut destinations: Option<Result<Vec<Destination>, DeliveryError>> = None;

        for source in &self.sources {
            let source_id = source.id();
            let items = match source.fetch_latest().await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(source = %source_id, error = %e, "source fetch failed, skipping");
                    counter!("relay_source_errors_total", "source" => source_id.as_str()).increment(1);
                    summary.source_errors += 1;
                    continue;
                }
            };
            summary.fetched += items.len() as u64;
            counter!("relay_items_fetched_total", "source" => source_id.as_str())
                .increment(items.len() as u64);

            for item in items {
                if !handled.insert((item.source_id, item.key.clone())) {
                    summary.skipped += 1;
                    continue;
                }
                match self.store.exists(item.source_id, &item.key).await {
                    Ok(true) => {
                        tracing::debug!(source = %item.source_id, key = %item.key, "already delivered");
                        summary.skipped += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        // Unknown novelty: do not post, do not record.
                        tracing::error!(source = %item.source_id, key = %item.key, error = %e, "dedup lookup failed");
                        summary.failed += 1;
                        continue;
                    }
                }

                if destinations.is_none() {
                    destinations = Some(self.resolve_destinations().await);
                }
                let Some(Ok(dests)) = &destinations else {
                    tracing::warn!(source = %item.source_id, key = %item.key, "no destinations, leaving item for next run");
                    summary.failed += 1;
                    continue;
                };

                tracing::info!(source = %item.source_id, key = %item.key, url = %item.url, "new item");
                if !self.deliver_everywhere(&item, dests).await {
                    summary.failed += 1;
                    continue;
                }

                summary.delivered += 1;
                if let Err(e) = self.store.commit(item.source_id, &item.key, now).await {
                    tracing::error!(
                        source = %item.source_id,
                        key = %item.key,
                        error = %e,
                        "item delivered but NOT recorded; it will be posted again next run"
                    );
                    summary.uncommitted += 1;
                }
            }
        }

        match self.sweeper.sweep(&self.store, now).await {
            Ok(n) => summary.pruned = n,
            Err(e) => tracing::error!(error = %e, "retention sweep failed"),
        }

        counter!("relay_items_skipped_total").increment(summary.skipped);
        counter!("relay_items_delivered_total").increment(summary.delivered);
        counter!("relay_items_failed_total").increment(summary.failed);
        counter!("relay_items_uncommitted_total").increment(summary.uncommitted);
        histogram!("relay_run_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
        gauge!("relay_last_run_ts").set(now.timestamp() as f64);

        tracing::info!(
            fetched = summary.fetched,
            skipped = summary.skipped,
            delivered = summary.delivered,
            failed = summary.failed,
            uncommitted = summary.uncommitted,
            source_errors = summary.source_errors,
            pruned = summary.pruned,
            "relay run finished"
        );
        summary
    }

    async fn resolve_destinations(&self) -> Result<Vec<Destination>, DeliveryError> {
        let resolved = self
            .delivery
            .resolve_destinations()
            .await
            .and_then(|d| if d.is_empty() { Err(DeliveryError::NoDestinations) } else { Ok(d) });
        match &resolved {
            Ok(d) => tracing::debug!(count = d.len(), "destinations resolved"),
            Err(e) => tracing::error!(error = %e, "could not resolve destinations"),
        }
        resolved
    }

    /// Attempt every destination once; true only if all of them succeeded.
    async fn deliver_everywhere(&self, item: &CandidateItem, dests: &[Destination]) -> bool {
        let mut failed = 0usize;
        for dest in dests {
            match self.delivery.deliver(item, dest).await {
                Ok(()) => tracing::info!(source = %item.source_id, key = %item.key, destination = %dest, "posted"),
                Err(e) => {
                    failed += 1;
                    tracing::error!(source = %item.source_id, key = %item.key, destination = %dest, error = %e, "delivery failed");
                }
            }
        }
        tracing::info!(
            source = %item.source_id,
            successful = dests.len() - failed,
            failed,
            "delivery pass complete"
        );
        failed == 0
    }
}
