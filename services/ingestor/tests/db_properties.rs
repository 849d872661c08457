//! PostgreSQL-backed properties of the store: idempotent upsert, retention
//! pruning, snapshot reads.
//!
//! These tests need a disposable database: set DB_URL and run
//! `cargo test -- --ignored --test-threads=1`. The schema is applied
//! automatically; the fuel_prices table is emptied per test.

use chrono::{Duration, Utc};
use ingestor::error::SnapshotError;
use ingestor::normalize::PriceRecord;
use ingestor::store;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS fuel_prices (
        region           TEXT NOT NULL,
        fuel_type        TEXT NOT NULL,
        average_price    DOUBLE PRECISION NOT NULL CHECK (average_price >= 0),
        publication_date DATE NOT NULL,
        CONSTRAINT fuel_prices_unique UNIQUE (region, fuel_type, publication_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_runs (
        job_run_id   UUID PRIMARY KEY,
        component    TEXT NOT NULL,
        triggered_by TEXT NOT NULL,
        status       TEXT NOT NULL,
        detail       JSONB NOT NULL DEFAULT '{}',
        error        TEXT,
        content_hash TEXT,
        started_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        finished_at  TIMESTAMPTZ
    )
    "#,
];

async fn test_pool() -> PgPool {
    let db_url = std::env::var("DB_URL").expect("DB_URL must be set for database tests");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&db_url)
        .await
        .expect("failed to connect to test database");
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await.expect("schema");
    }
    sqlx::query("DELETE FROM fuel_prices")
        .execute(&pool)
        .await
        .expect("clean fuel_prices");
    pool
}

fn record(region: &str, fuel: &str, price: f64, date: chrono::NaiveDate) -> PriceRecord {
    PriceRecord {
        region: region.to_string(),
        fuel_type: fuel.to_string(),
        average_price: price,
        publication_date: date,
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DB_URL)"]
async fn test_reingestion_is_idempotent() {
    let pool = test_pool().await;
    let date = Utc::now().date_naive();
    let batch = vec![
        record("Lombardia", "Benzina", 1.859, date),
        record("Lombardia", "Gasolio", 1.712, date),
        record("Veneto", "Benzina", 1.861, date),
    ];

    let first = store::upsert_batch(&pool, &batch).await.unwrap();
    assert_eq!(first, 3);

    // Same document again: no duplicates, no duplicate-key errors
    let second = store::upsert_batch(&pool, &batch).await.unwrap();
    assert_eq!(second, 0);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM fuel_prices")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DB_URL)"]
async fn test_prune_deletes_only_stale_rows() {
    let pool = test_pool().await;
    let today = Utc::now().date_naive();
    let batch = vec![
        record("Lombardia", "Benzina", 1.859, today),
        record("Lombardia", "Benzina", 1.843, today - Duration::days(10)),
        record("Lombardia", "Benzina", 1.801, today - Duration::days(40)),
    ];
    store::upsert_batch(&pool, &batch).await.unwrap();

    let deleted = store::prune_stale(&pool, 30).await.unwrap();
    assert_eq!(deleted, 1);

    let dates: Vec<(chrono::NaiveDate,)> =
        sqlx::query_as("SELECT publication_date FROM fuel_prices ORDER BY publication_date")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(dates.len(), 2);
    assert_eq!(dates[0].0, today - Duration::days(10));
    assert_eq!(dates[1].0, today);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DB_URL)"]
async fn test_snapshot_reports_full_vocabulary_at_latest_date() {
    let pool = test_pool().await;
    let today = Utc::now().date_naive();
    let batch = vec![
        // Older date with the full set, latest date with Benzina only
        record("Molise", "Benzina", 1.80, today - Duration::days(7)),
        record("Molise", "Gasolio", 1.70, today - Duration::days(7)),
        record("Molise", "GPL", 0.72, today - Duration::days(7)),
        record("Molise", "Metano", 1.33, today - Duration::days(7)),
        record("Molise", "Benzina", 1.85, today),
    ];
    store::upsert_batch(&pool, &batch).await.unwrap();

    let snapshot = store::latest_snapshot(&pool, "Molise").await.unwrap();
    assert_eq!(snapshot.publication_date, today);
    assert_eq!(snapshot.prices.len(), 4);
    assert_eq!(snapshot.prices[0].fuel_type, "Benzina");
    assert_eq!(snapshot.prices[0].average_price, Some(1.85));
    assert!(snapshot.prices[1..].iter().all(|p| p.average_price.is_none()));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DB_URL)"]
async fn test_snapshot_unknown_region_is_not_found() {
    let pool = test_pool().await;
    let result = store::latest_snapshot(&pool, "Atlantis").await;
    assert!(matches!(result, Err(SnapshotError::NotFound)));
}
