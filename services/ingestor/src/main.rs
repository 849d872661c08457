//! Ingestor CLI - runs one ingestion batch against the configured source.
//!
//! Usage:
//!   # Full run (cron-friendly):
//!   cargo run --bin ingestor
//!
//!   # Validate the document without writing anything:
//!   cargo run --bin ingestor -- --dry-run
//!
//!   # Re-ingest even if the document is unchanged:
//!   cargo run --bin ingestor -- --force

use anyhow::{Context, Result};
use clap::Parser;
use ingestor::config::Config;
use ingestor::{fetch, ingest, normalize, parse};
use sqlx::postgres::PgPoolOptions;

#[derive(Parser, Debug)]
#[command(name = "ingestor", about = "Ingests regional average fuel prices")]
struct Args {
    /// Override the source CSV URL
    #[arg(long)]
    url: Option<String>,

    /// Override the retention horizon in days
    #[arg(long)]
    retention_days: Option<i32>,

    /// Ingest even if the document hash matches the last successful run
    #[arg(long, default_value = "false")]
    force: bool,

    /// Fetch and validate without touching the database
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(url) = args.url {
        config.csv_url = url;
    }
    if let Some(days) = args.retention_days {
        anyhow::ensure!(days > 0, "--retention-days must be positive");
        config.retention_days = days;
    }

    println!("=== Fuel Price Ingestor ===");
    println!("Source: {}", config.csv_url);
    println!("Retention: {} days", config.retention_days);

    let client = fetch::build_client(config.fetch_timeout)?;

    if args.dry_run {
        let raw = fetch::fetch_document(&client, &config.csv_url).await?;
        println!("Downloaded {} bytes ({})", raw.len(), fetch::content_hash(&raw));

        let document = parse::parse_document(&raw)?;
        println!("Publication date: {}", document.publication_date);
        println!("Header: {:?}", document.header);

        let mut accepted = 0usize;
        let mut skipped = 0usize;
        for (idx, row) in document.rows.iter().enumerate() {
            match normalize::normalize_row(
                row,
                document.publication_date,
                normalize::REGIONS,
                normalize::FUEL_TYPES,
            ) {
                Ok(_) => accepted += 1,
                Err(reason) => {
                    skipped += 1;
                    eprintln!("Warning: line {} skipped ({})", idx + 3, reason);
                }
            }
        }

        println!("\n=== Dry Run Complete ===");
        println!(
            "Rows read: {}, accepted: {}, skipped: {} - nothing saved",
            document.rows.len(),
            accepted,
            skipped
        );
        return Ok(());
    }

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .context("Failed to connect to database")?;

    let report = ingest::run_ingestion(&pool, &client, &config, "cli", args.force).await?;

    println!("\n=== Ingestion Complete ===");
    if report.unchanged {
        println!("Document unchanged, nothing to insert");
    } else {
        if let Some(date) = report.publication_date {
            println!("Publication date: {}", date);
        }
        println!("Rows read: {}", report.rows_seen);
        println!("Rows newly inserted: {}", report.rows_inserted);
        println!("Rows skipped: {}", report.rows_skipped);
    }
    match report.rows_pruned {
        Some(count) => println!("Rows pruned: {}", count),
        None => println!("Prune step failed (see warnings above)"),
    }

    Ok(())
}
