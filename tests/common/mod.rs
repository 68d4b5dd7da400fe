// tests/common/mod.rs
// Shared fakes for relay integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ucg_news_relay::{
    CandidateItem, DedupStore, Delivery, DeliveryError, Destination, FetchError, Source, SourceId,
    SqliteStore, StoreError,
};

/// Ordered record of side effects shared between the delivery and store fakes.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn item(source: SourceId, key: &str) -> CandidateItem {
    CandidateItem::new(source, key, format!("https://example.test/{}/{key}", source.as_str()))
        .with_title(format!("Item {key}"))
}

/// Source whose output the test can swap between runs.
pub struct StaticSource {
    id: SourceId,
    items: Arc<Mutex<Vec<CandidateItem>>>,
    fail: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct SourceHandle {
    items: Arc<Mutex<Vec<CandidateItem>>>,
    fail: Arc<AtomicBool>,
}

impl SourceHandle {
    pub fn set(&self, items: Vec<CandidateItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl StaticSource {
    pub fn new(id: SourceId, items: Vec<CandidateItem>) -> (Box<dyn Source>, SourceHandle) {
        let items = Arc::new(Mutex::new(items));
        let fail = Arc::new(AtomicBool::new(false));
        let handle = SourceHandle {
            items: items.clone(),
            fail: fail.clone(),
        };
        (Box::new(Self { id, items, fail }), handle)
    }
}

#[async_trait]
impl Source for StaticSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, FetchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::RateLimited);
        }
        Ok(self.items.lock().unwrap().clone())
    }
}

pub fn webhook(label: &str) -> Destination {
    Destination::Webhook {
        label: label.to_string(),
        url: format!("https://hooks.example.test/{label}"),
    }
}

/// Records every delivery attempt as `(item key, destination label)`.
pub struct RecordingDelivery {
    dests: Vec<Destination>,
    failing: Mutex<HashSet<String>>,
    resolve_fails: AtomicBool,
    resolves: AtomicU32,
    calls: Mutex<Vec<(String, String)>>,
    log: Option<EventLog>,
}

impl RecordingDelivery {
    pub fn new(dests: Vec<Destination>) -> Self {
        Self {
            dests,
            failing: Mutex::new(HashSet::new()),
            resolve_fails: AtomicBool::new(false),
            resolves: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
            log: None,
        }
    }

    /// Also append `deliver:<key>@<destination>` to `log`.
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn fail_destination(&self, label: &str, fail: bool) {
        let mut f = self.failing.lock().unwrap();
        if fail {
            f.insert(label.to_string());
        } else {
            f.remove(label);
        }
    }

    pub fn fail_resolution(&self, fail: bool) {
        self.resolve_fails.store(fail, Ordering::SeqCst);
    }

    pub fn resolves(&self) -> u32 {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn delivered_keys(&self) -> Vec<String> {
        self.calls().into_iter().map(|(k, _)| k).collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

fn label_of(dest: &Destination) -> String {
    match dest {
        Destination::Webhook { label, .. } => label.clone(),
        Destination::Channel { guild, .. } => guild.clone(),
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn resolve_destinations(&self) -> Result<Vec<Destination>, DeliveryError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.resolve_fails.load(Ordering::SeqCst) {
            return Err(DeliveryError::RateLimited);
        }
        Ok(self.dests.clone())
    }

    async fn deliver(&self, item: &CandidateItem, dest: &Destination) -> Result<(), DeliveryError> {
        let label = label_of(dest);
        self.calls
            .lock()
            .unwrap()
            .push((item.key.clone(), label.clone()));
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("deliver:{}@{}", item.key, label));
        }
        if self.failing.lock().unwrap().contains(&label) {
            return Err(DeliveryError::Forbidden(label));
        }
        Ok(())
    }
}

/// SQLite store with switchable faults.
pub struct FlakyStore {
    pub inner: SqliteStore,
    fail_commits: AtomicBool,
    fail_exists: AtomicBool,
    failing_keys: Mutex<HashSet<String>>,
    log: Option<EventLog>,
}

impl FlakyStore {
    pub async fn in_memory() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().await.unwrap(),
            fail_commits: AtomicBool::new(false),
            fail_exists: AtomicBool::new(false),
            failing_keys: Mutex::new(HashSet::new()),
            log: None,
        }
    }

    /// Also append `commit:<key>` (or `commit-failed:<key>`) to `log`.
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Fail commits of this key only.
    pub fn fail_commit_of(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_exists(&self, fail: bool) {
        self.fail_exists.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DedupStore for FlakyStore {
    async fn exists(&self, source: SourceId, key: &str) -> Result<bool, StoreError> {
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(StoreError::Query(sqlx::Error::PoolClosed));
        }
        self.inner.exists(source, key).await
    }

    async fn commit(&self, source: SourceId, key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let fail = self.fail_commits.load(Ordering::SeqCst)
            || self.failing_keys.lock().unwrap().contains(key);
        if let Some(log) = &self.log {
            let tag = if fail { "commit-failed" } else { "commit" };
            log.lock().unwrap().push(format!("{tag}:{key}"));
        }
        if fail {
            return Err(StoreError::Write(sqlx::Error::PoolClosed));
        }
        self.inner.commit(source, key, at).await
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.prune(cutoff).await
    }
}
