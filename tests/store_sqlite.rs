// tests/store_sqlite.rs
mod common;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use common::{item, webhook, RecordingDelivery, StaticSource};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use ucg_news_relay::{DedupStore, Relay, RelayConfig, RetentionSweeper, SourceId, SqliteStore};

#[tokio::test]
async fn records_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("relay.db");

    let store = SqliteStore::open(&db).await.unwrap();
    let (src, _) = StaticSource::new(SourceId::UltramanNews, vec![item(SourceId::UltramanNews, "300")]);
    let relay = Relay::new(vec![src], store, RecordingDelivery::new(vec![webhook("A")]));
    assert_eq!(relay.run_once().await.delivered, 1);
    relay.shutdown().await;

    // Fresh process: new store handle, same file.
    let store = SqliteStore::open(&db).await.unwrap();
    let (src, _) = StaticSource::new(SourceId::UltramanNews, vec![item(SourceId::UltramanNews, "300")]);
    let relay = Relay::new(vec![src], store, RecordingDelivery::new(vec![webhook("A")]));
    let s = relay.run_once().await;
    assert_eq!(s.delivered, 0);
    assert_eq!(s.skipped, 1);
    assert!(relay.delivery().calls().is_empty());
    relay.shutdown().await;
}

#[tokio::test]
async fn prune_on_file_store_keeps_young_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("relay.db")).await.unwrap();
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    for (key, age) in [("a", 40), ("b", 31), ("c", 5)] {
        store
            .commit(SourceId::X, key, now - ChronoDuration::days(age))
            .await
            .unwrap();
    }

    assert_eq!(store.prune(now - ChronoDuration::days(30)).await.unwrap(), 2);
    assert_eq!(store.len().await.unwrap(), 1);
    assert!(store.exists(SourceId::X, "c").await.unwrap());
    store.close().await;
}

#[tokio::test]
async fn legacy_posted_urls_are_imported_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("bot_data.db");

    {
        let opts = SqliteConnectOptions::new().filename(&db).create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await.unwrap();
        sqlx::query(
            "CREATE TABLE posted_content (url TEXT PRIMARY KEY, posted_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP, source TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        for (url, source) in [
            ("https://x.com/ucg_en/status/1800000000000000001", "X/Twitter"),
            ("https://www.youtube.com/watch?v=abcDEF12345", "YouTube"),
            ("https://ultraman-cardgame.com/page/us/news/news-detail/412", "Ultraman News"),
            ("https://facebook.com/some/post", "Facebook"),
        ] {
            sqlx::query("INSERT INTO posted_content (url, source) VALUES (?, ?)")
                .bind(url)
                .bind(source)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;
    }

    let store = SqliteStore::open(&db).await.unwrap();
    assert!(store.exists(SourceId::X, "1800000000000000001").await.unwrap());
    assert!(store.exists(SourceId::Youtube, "abcDEF12345").await.unwrap());
    assert!(store.exists(SourceId::UltramanNews, "412").await.unwrap());
    assert_eq!(store.len().await.unwrap(), 3);

    // Pruned rows must not come back from the legacy table on the next open.
    store.prune(Utc::now() + ChronoDuration::days(1)).await.unwrap();
    store.close().await;
    let store = SqliteStore::open(&db).await.unwrap();
    assert!(store.is_empty().await.unwrap());
    store.close().await;
}

#[tokio::test]
async fn zero_day_retention_never_reaches_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("relay.db")).await.unwrap();
    let now = Utc::now();
    store
        .commit(SourceId::UltramanNews, "fresh", now - ChronoDuration::minutes(5))
        .await
        .unwrap();

    let mut cfg = RelayConfig::default();
    cfg.apply_env(|k| (k == "RETENTION_DAYS").then(|| "0".to_string()))
        .unwrap();
    let err = RetentionSweeper::from_config(&cfg).unwrap_err();
    assert!(err.to_string().contains("RETENTION_DAYS"), "{err}");

    cfg.retention_days = 30;
    let sweeper = RetentionSweeper::from_config(&cfg).unwrap();
    assert_eq!(sweeper.sweep(&store, now).await.unwrap(), 0);
    assert!(store.exists(SourceId::UltramanNews, "fresh").await.unwrap());
    store.close().await;
}
