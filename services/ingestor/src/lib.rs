//! Ingestor - fuel price ingestion pipeline
//!
//! Responsibilities:
//! - Fetch the regional average fuel price CSV from the ministry site
//! - Decode and parse the document (publication date header + `;` records)
//! - Validate rows against the canonical region and fuel vocabularies
//! - Upsert price facts into PostgreSQL (idempotent on re-ingestion)
//! - Prune facts older than the retention horizon
//! - Serve the latest per-region snapshot
//! - Track job runs for auditing
//!
//! Usage:
//!   # One batch run (cron-friendly):
//!   cargo run --bin ingestor
//!
//!   # Validate the live document without touching the database:
//!   cargo run --bin ingestor -- --dry-run

pub mod config;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod normalize;
pub mod parse;
pub mod store;
