//! Error taxonomy for the ingestion pipeline.
//!
//! Batch-level failures (fetch, parse, persistence) abort the run; prune
//! failures stay confined to the pruning step and are demoted to warnings
//! by the orchestrator. Row-level rejections are not errors at all - see
//! `normalize::SkipReason`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document is neither valid UTF-8 nor Windows-1252")]
    Encoding,
    #[error("first line '{0}' does not carry a publication date")]
    MissingDate(String),
    #[error("cannot parse '{0}' as a DD-MM-YYYY date")]
    BadDate(String),
    #[error("header row is unreadable: {0}")]
    Header(String),
    #[error("document is empty after the date line")]
    Empty,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("download failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("document parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("batch persistence failed: {0}")]
    Persistence(sqlx::Error),
    #[error("retention prune failed: {0}")]
    Prune(sqlx::Error),
}

/// Outcomes of a snapshot lookup, kept distinct so callers can message
/// "no data yet", "database down" and "store violated its own invariant"
/// differently.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no data for this region")]
    NotFound,
    #[error("a latest date exists but no price rows were found for it")]
    Inconsistent,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
