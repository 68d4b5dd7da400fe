// src/ingest/scheduler.rs
use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tokio::time::MissedTickBehavior;

use crate::notify::Delivery;
use crate::relay::{Relay, RunSummary};
use crate::store::DedupStore;

#[derive(Clone, Copy, Debug)]
pub struct WatchCfg {
    pub interval: Duration,
    /// Stop after this many runs; `None` runs until shutdown.
    pub max_runs: Option<u64>,
}

/// Run the relay on a fixed interval until `shutdown` resolves.
///
/// The first run starts immediately. Runs never overlap: a slow run delays
/// the next tick instead of queueing a burst. `after_run` sees every summary
/// (the binary uses it to flush metrics). Returns the number of completed runs.
pub async fn watch<S, D, F, A>(relay: &Relay<S, D>, cfg: WatchCfg, shutdown: F, mut after_run: A) -> u64
where
    S: DedupStore,
    D: Delivery,
    F: Future<Output = ()>,
    A: FnMut(&RunSummary),
{
    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut runs = 0u64;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(runs, "shutdown requested, leaving watch loop");
                break;
            }
            _ = ticker.tick() => {
                let summary = relay.run_once().await;
                runs += 1;
                counter!("relay_runs_total").increment(1);
                if summary.has_failures() {
                    tracing::warn!(run = runs, failed = summary.failed, uncommitted = summary.uncommitted, "run finished with item failures");
                }
                after_run(&summary);
                if cfg.max_runs.is_some_and(|max| runs >= max) {
                    break;
                }
            }
        }
    }
    runs
}
