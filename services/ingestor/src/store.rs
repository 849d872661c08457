//! Upsert Store, Retention Pruner and Snapshot Reader over PostgreSQL,
//! plus the job-run audit helpers.
//!
//! Persistence is conflict-idempotent: re-inserting an existing
//! (region, fuel_type, publication_date) triple affects zero rows instead
//! of raising. A non-conflict error rolls back the whole batch - nothing
//! from a failed run is left behind.

use crate::error::{IngestError, SnapshotError};
use crate::normalize::{PriceRecord, FUEL_TYPES};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

// =============================================================================
// Upsert Store
// =============================================================================

/// Persist a batch in one transaction, returning the count of rows actually
/// newly inserted (conflicting triples are silent no-ops). Any other
/// database error aborts the transaction and the whole batch rolls back.
pub async fn upsert_batch(pool: &PgPool, records: &[PriceRecord]) -> Result<u64, IngestError> {
    let mut tx = pool.begin().await.map_err(IngestError::Persistence)?;

    let mut inserted = 0u64;
    for record in records {
        let result = sqlx::query(
            r#"
            INSERT INTO fuel_prices (region, fuel_type, average_price, publication_date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (region, fuel_type, publication_date) DO NOTHING
            "#,
        )
        .bind(&record.region)
        .bind(&record.fuel_type)
        .bind(record.average_price)
        .bind(record.publication_date)
        .execute(&mut *tx)
        .await
        .map_err(IngestError::Persistence)?;

        inserted += result.rows_affected();
    }

    tx.commit().await.map_err(IngestError::Persistence)?;
    Ok(inserted)
}

// =============================================================================
// Retention Pruner
// =============================================================================

/// First date that survives pruning is the cutoff itself; only strictly
/// older rows are deleted.
pub fn retention_cutoff(today: NaiveDate, retention_days: i32) -> NaiveDate {
    today - Duration::days(retention_days as i64)
}

/// Delete facts older than the retention horizon. Runs as its own
/// single-statement transaction, after and independent of the upsert.
pub async fn prune_stale(pool: &PgPool, retention_days: i32) -> Result<u64, IngestError> {
    let cutoff = retention_cutoff(Utc::now().date_naive(), retention_days);
    let result = sqlx::query("DELETE FROM fuel_prices WHERE publication_date < $1")
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(IngestError::Prune)?;
    Ok(result.rows_affected())
}

// =============================================================================
// Snapshot Reader
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FuelPrice {
    pub fuel_type: String,
    pub average_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub region: String,
    pub publication_date: NaiveDate,
    pub prices: Vec<FuelPrice>,
}

/// Latest snapshot for a region: the most recent publication date and the
/// full fuel vocabulary at that date, absent fuels included with no price.
pub async fn latest_snapshot(pool: &PgPool, region: &str) -> Result<Snapshot, SnapshotError> {
    let latest: Option<(Option<NaiveDate>,)> =
        sqlx::query_as("SELECT MAX(publication_date) FROM fuel_prices WHERE region = $1")
            .bind(region)
            .fetch_optional(pool)
            .await?;

    let publication_date = match latest.and_then(|(date,)| date) {
        Some(date) => date,
        None => return Err(SnapshotError::NotFound),
    };

    let rows: Vec<(String, f64)> = sqlx::query_as(
        r#"
        SELECT fuel_type, average_price
        FROM fuel_prices
        WHERE region = $1 AND publication_date = $2
        "#,
    )
    .bind(region)
    .bind(publication_date)
    .fetch_all(pool)
    .await?;

    // Unreachable if the uniqueness invariant holds: a MAX date implies rows.
    if rows.is_empty() {
        return Err(SnapshotError::Inconsistent);
    }

    Ok(Snapshot {
        region: region.to_string(),
        publication_date,
        prices: assemble_prices(&rows, FUEL_TYPES),
    })
}

/// Fixed-shape price list: every fuel of the vocabulary exactly once, in
/// priority order, then any other reported fuel appended by name.
pub fn assemble_prices(rows: &[(String, f64)], vocabulary: &[&str]) -> Vec<FuelPrice> {
    let mut prices: Vec<FuelPrice> = vocabulary
        .iter()
        .map(|fuel| FuelPrice {
            fuel_type: fuel.to_string(),
            average_price: rows.iter().find(|(f, _)| f == fuel).map(|(_, p)| *p),
        })
        .collect();

    let mut extras: Vec<&(String, f64)> = rows
        .iter()
        .filter(|(fuel, _)| !vocabulary.contains(&fuel.as_str()))
        .collect();
    extras.sort_by(|a, b| a.0.cmp(&b.0));
    for (fuel, price) in extras {
        prices.push(FuelPrice {
            fuel_type: fuel.clone(),
            average_price: Some(*price),
        });
    }

    prices
}

// =============================================================================
// Job runs (audit)
// =============================================================================

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct JobRun {
    pub job_run_id: Uuid,
    pub component: String,
    pub triggered_by: String,
    pub status: String,
    pub error: Option<String>,
    pub detail: serde_json::Value,
    pub content_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Create a new job run record.
pub async fn create_job_run(pool: &PgPool, triggered_by: &str) -> Result<Uuid, sqlx::Error> {
    let job_run_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO job_runs (job_run_id, component, triggered_by, status, detail)
        VALUES ($1, 'ingestor', $2, 'running', '{}')
        "#,
    )
    .bind(job_run_id)
    .bind(triggered_by)
    .execute(pool)
    .await?;

    Ok(job_run_id)
}

/// Update job run status and attach counters.
pub async fn finish_job_run(
    pool: &PgPool,
    job_run_id: Uuid,
    status: &str,
    error: Option<&str>,
    content_hash: Option<&str>,
    detail: serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE job_runs
        SET finished_at = now(), status = $2, error = $3, content_hash = $4, detail = detail || $5
        WHERE job_run_id = $1
        "#,
    )
    .bind(job_run_id)
    .bind(status)
    .bind(error)
    .bind(content_hash)
    .bind(detail)
    .execute(pool)
    .await?;

    Ok(())
}

/// Content hash of the last successful ingestion, if any.
pub async fn last_successful_hash(pool: &PgPool) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT content_hash FROM job_runs
        WHERE component = 'ingestor' AND status = 'ok' AND content_hash IS NOT NULL
        ORDER BY finished_at DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(hash,)| hash))
}

/// Most recent job runs, newest first.
pub async fn recent_job_runs(pool: &PgPool, limit: i64) -> Result<Vec<JobRun>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT job_run_id, component, triggered_by, status, error, detail, content_hash,
               started_at, finished_at
        FROM job_runs
        ORDER BY started_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_cutoff() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 5).unwrap();
        assert_eq!(
            retention_cutoff(today, 30),
            NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
        );
    }

    #[test]
    fn test_retention_keeps_recent_dates() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 5).unwrap();
        let cutoff = retention_cutoff(today, 30);
        // today and today-10 survive, today-40 is strictly older than the cutoff
        assert!(!(today < cutoff));
        assert!(!(today - Duration::days(10) < cutoff));
        assert!(today - Duration::days(40) < cutoff);
        // the boundary date itself is kept
        assert!(!(today - Duration::days(30) < cutoff));
    }

    #[test]
    fn test_assemble_prices_full_vocabulary() {
        let rows = vec![
            ("Gasolio".to_string(), 1.712),
            ("Benzina".to_string(), 1.859),
            ("Metano".to_string(), 1.334),
            ("GPL".to_string(), 0.721),
        ];
        let prices = assemble_prices(&rows, FUEL_TYPES);
        let fuels: Vec<&str> = prices.iter().map(|p| p.fuel_type.as_str()).collect();
        assert_eq!(fuels, vec!["Benzina", "Gasolio", "GPL", "Metano"]);
        assert_eq!(prices[0].average_price, Some(1.859));
        assert_eq!(prices[3].average_price, Some(1.334));
    }

    #[test]
    fn test_assemble_prices_missing_fuels_not_omitted() {
        // Only Benzina reported: the other three fuels stay, price-less
        let rows = vec![("Benzina".to_string(), 1.859)];
        let prices = assemble_prices(&rows, FUEL_TYPES);
        assert_eq!(prices.len(), 4);
        assert_eq!(prices[0].average_price, Some(1.859));
        assert!(prices[1..].iter().all(|p| p.average_price.is_none()));
    }

    #[test]
    fn test_assemble_prices_unlisted_fuel_appended() {
        let rows = vec![
            ("Benzina".to_string(), 1.859),
            ("Benzina speciale".to_string(), 2.001),
        ];
        let prices = assemble_prices(&rows, FUEL_TYPES);
        assert_eq!(prices.len(), 5);
        assert_eq!(prices[4].fuel_type, "Benzina speciale");
        assert_eq!(prices[4].average_price, Some(2.001));
    }

    #[test]
    fn test_assemble_prices_fixture_vocabulary() {
        let rows = vec![("Diesel".to_string(), 1.5)];
        let prices = assemble_prices(&rows, &["Diesel", "Petrol"]);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].average_price, Some(1.5));
        assert_eq!(prices[1].fuel_type, "Petrol");
        assert_eq!(prices[1].average_price, None);
    }
}
