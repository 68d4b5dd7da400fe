// src/metrics.rs
//! Relay counters and the optional Prometheus textfile dump.
//!
//! A cron-style job has no long-lived `/metrics` endpoint, so the exposition
//! is written to a file for node-exporter's textfile collector instead.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up even when zero).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "relay_items_fetched_total",
            "Candidate items returned by sources."
        );
        describe_counter!(
            "relay_items_skipped_total",
            "Candidates already present in the dedup store."
        );
        describe_counter!(
            "relay_items_delivered_total",
            "Items posted to every destination."
        );
        describe_counter!(
            "relay_items_failed_total",
            "Items whose delivery failed for at least one destination."
        );
        describe_counter!(
            "relay_items_uncommitted_total",
            "Items delivered but not recorded; these will be reposted."
        );
        describe_counter!("relay_source_errors_total", "Source fetch failures.");
        describe_counter!(
            "relay_records_pruned_total",
            "Dedup records removed by retention."
        );
        describe_counter!("relay_runs_total", "Runs completed by the watch loop.");
        describe_histogram!("relay_run_duration_ms", "Wall time of one relay run.");
        describe_gauge!("relay_last_run_ts", "Unix ts when the relay last finished a run.");
    });
}

pub struct TextfileExporter {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl TextfileExporter {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn install(path: &Path) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self {
            handle,
            path: path.to_path_buf(),
        })
    }

    /// Write the current exposition atomically (temp file + rename).
    pub fn flush(&self) -> Result<()> {
        let body = self.handle.render();
        let tmp = self.path.with_extension("prom.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming into {}", self.path.display()))?;
        Ok(())
    }
}
