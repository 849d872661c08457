//! Batch orchestration: fetch -> parse -> normalize -> upsert -> prune,
//! bracketed by a job-run audit record.
//!
//! Failure policy per stage: fetch and parse errors are fatal with no
//! partial effect; row rejections are counted and logged; a persistence
//! error rolls the whole batch back; a prune failure is logged and never
//! flips a successful ingestion to failed.

use crate::config::Config;
use crate::error::IngestError;
use crate::fetch;
use crate::normalize::{self, PriceRecord};
use crate::parse;
use crate::store;
use chrono::NaiveDate;
use sqlx::PgPool;

#[derive(Debug)]
pub struct IngestReport {
    /// None when the run short-circuited on an unchanged document.
    pub publication_date: Option<NaiveDate>,
    pub content_hash: String,
    pub unchanged: bool,
    pub rows_seen: usize,
    pub rows_inserted: u64,
    pub rows_skipped: usize,
    /// None when the prune step failed (logged, not fatal).
    pub rows_pruned: Option<u64>,
}

/// Run one ingestion batch and record it as a job run. `triggered_by` is
/// "cli" or "http"; `force` ingests even when the document hash matches the
/// last successful run.
pub async fn run_ingestion(
    pool: &PgPool,
    client: &reqwest::Client,
    config: &Config,
    triggered_by: &str,
    force: bool,
) -> Result<IngestReport, IngestError> {
    let job_run_id = store::create_job_run(pool, triggered_by)
        .await
        .map_err(IngestError::Persistence)?;

    let result = execute_batch(pool, client, config, force).await;

    match &result {
        Ok(report) => {
            let detail = serde_json::json!({
                "publication_date": report.publication_date.map(|d| d.to_string()),
                "unchanged": report.unchanged,
                "rows_seen": report.rows_seen,
                "rows_inserted": report.rows_inserted,
                "rows_skipped": report.rows_skipped,
                "rows_pruned": report.rows_pruned,
            });
            if let Err(e) = store::finish_job_run(
                pool,
                job_run_id,
                "ok",
                None,
                Some(&report.content_hash),
                detail,
            )
            .await
            {
                eprintln!("Warning: could not record job run {}: {}", job_run_id, e);
            }
        }
        Err(e) => {
            if let Err(db_err) = store::finish_job_run(
                pool,
                job_run_id,
                "failed",
                Some(&e.to_string()),
                None,
                serde_json::json!({}),
            )
            .await
            {
                eprintln!("Warning: could not record job run {}: {}", job_run_id, db_err);
            }
        }
    }

    result
}

async fn execute_batch(
    pool: &PgPool,
    client: &reqwest::Client,
    config: &Config,
    force: bool,
) -> Result<IngestReport, IngestError> {
    let raw = fetch::fetch_document(client, &config.csv_url).await?;
    let content_hash = fetch::content_hash(&raw);
    println!("Downloaded {} bytes ({})", raw.len(), content_hash);

    if !force {
        match store::last_successful_hash(pool).await {
            Ok(Some(previous)) if previous == content_hash => {
                println!("Document unchanged since last successful run, skipping upsert");
                let rows_pruned = run_prune(pool, config.retention_days).await;
                return Ok(IngestReport {
                    publication_date: None,
                    content_hash,
                    unchanged: true,
                    rows_seen: 0,
                    rows_inserted: 0,
                    rows_skipped: 0,
                    rows_pruned,
                });
            }
            Ok(_) => {}
            Err(e) => eprintln!("Warning: could not read last content hash: {}", e),
        }
    }

    let document = parse::parse_document(&raw)?;
    println!("Publication date: {}", document.publication_date);
    println!("Header: {:?}", document.header);

    let mut records: Vec<PriceRecord> = Vec::new();
    let mut rows_skipped = 0usize;
    for (idx, row) in document.rows.iter().enumerate() {
        match normalize::normalize_row(
            row,
            document.publication_date,
            normalize::REGIONS,
            normalize::FUEL_TYPES,
        ) {
            Ok(record) => records.push(record),
            Err(reason) => {
                rows_skipped += 1;
                // +3: 1-indexed, date line, header line
                eprintln!("Warning: line {} skipped ({}): {:?}", idx + 3, reason, row);
            }
        }
    }
    let rows_seen = document.rows.len();
    println!(
        "Rows read: {}, accepted: {}, skipped: {}",
        rows_seen,
        records.len(),
        rows_skipped
    );

    let rows_inserted = store::upsert_batch(pool, &records).await?;
    println!("Rows newly inserted: {}", rows_inserted);

    let rows_pruned = run_prune(pool, config.retention_days).await;

    Ok(IngestReport {
        publication_date: Some(document.publication_date),
        content_hash,
        unchanged: false,
        rows_seen,
        rows_inserted,
        rows_skipped,
        rows_pruned,
    })
}

/// Prune failures never fail the batch; they surface as a missing count.
async fn run_prune(pool: &PgPool, retention_days: i32) -> Option<u64> {
    match store::prune_stale(pool, retention_days).await {
        Ok(count) => {
            println!("Pruned {} rows older than {} days", count, retention_days);
            Some(count)
        }
        Err(e) => {
            eprintln!("Warning: retention prune failed: {}", e);
            None
        }
    }
}
