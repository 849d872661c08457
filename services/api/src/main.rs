//! API Service - snapshot queries and the manual ingestion trigger
//!
//! Endpoints:
//! - GET /health - Liveness probe
//! - GET /prices?region= - Latest per-region price snapshot
//! - GET /jobs?limit= - Recent ingestion job runs
//! - POST /trigger-update?secret= - Enqueue one ingestion run
//!
//! Triggered ingestion is fire-and-forget: the handler pushes a job onto a
//! single-slot queue and one worker task consumes it serially, so at most
//! one ingestion is ever in flight.

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use ingestor::config::Config;
use ingestor::error::SnapshotError;
use ingestor::{fetch, ingest, store};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

// ============================================================================
// State
// ============================================================================

struct AppState {
    pool: PgPool,
    trigger_tx: mpsc::Sender<IngestJob>,
    update_secret: String,
}

#[derive(Debug)]
struct IngestJob {
    force: bool,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct PriceEntry {
    fuel_type: String,
    average_price: Option<f64>,
    display: String,
}

#[derive(Serialize)]
struct SnapshotResponse {
    region: String,
    publication_date: NaiveDate,
    prices: Vec<PriceEntry>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Query params
// ============================================================================

#[derive(Deserialize)]
struct PricesQuery {
    region: String,
}

#[derive(Deserialize)]
struct JobsQuery {
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct TriggerQuery {
    secret: Option<String>,
    #[serde(default)]
    force: bool,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: "0.1.0",
    })
}

/// Prices are published with three-decimal precision; absent fuels render
/// as "N.D." instead of being omitted.
fn price_display(price: Option<f64>) -> String {
    match price {
        Some(value) => format!("{:.3}", value),
        None => "N.D.".to_string(),
    }
}

async fn prices_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PricesQuery>,
) -> impl IntoResponse {
    let region = params.region.trim();

    match store::latest_snapshot(&state.pool, region).await {
        Ok(snapshot) => {
            let prices: Vec<PriceEntry> = snapshot
                .prices
                .iter()
                .map(|p| PriceEntry {
                    fuel_type: p.fuel_type.clone(),
                    average_price: p.average_price,
                    display: price_display(p.average_price),
                })
                .collect();

            Json(SnapshotResponse {
                region: snapshot.region,
                publication_date: snapshot.publication_date,
                prices,
            })
            .into_response()
        }
        Err(SnapshotError::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No price data available for region '{}'", region),
            }),
        )
            .into_response(),
        Err(SnapshotError::Inconsistent) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!(
                    "Internal inconsistency while reading prices for '{}'",
                    region
                ),
            }),
        )
            .into_response(),
        Err(SnapshotError::Db(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Database unavailable: {}", e),
            }),
        )
            .into_response(),
    }
}

async fn jobs_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<JobsQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    match store::recent_job_runs(&state.pool, limit).await {
        Ok(jobs) => Json(serde_json::json!({ "jobs": jobs })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn trigger_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TriggerQuery>,
) -> impl IntoResponse {
    let secret = match params.secret {
        Some(secret) => secret,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Missing 'secret' parameter".to_string(),
                }),
            )
                .into_response();
        }
    };

    if secret != state.update_secret {
        return (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "Invalid secret".to_string(),
            }),
        )
            .into_response();
    }

    match state.trigger_tx.try_send(IngestJob { force: params.force }) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "queued" })),
        )
            .into_response(),
        Err(mpsc::error::TrySendError::Full(_)) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "An ingestion run is already queued or in flight".to_string(),
            }),
        )
            .into_response(),
        Err(mpsc::error::TrySendError::Closed(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Ingestion worker is not running".to_string(),
            }),
        )
            .into_response(),
    }
}

// ============================================================================
// Ingestion worker
// ============================================================================

/// The only place ingestion runs in this process. Jobs arrive through a
/// bounded channel and are processed one at a time; the outcome of each run
/// lands in the job_runs table.
async fn ingestion_worker(mut rx: mpsc::Receiver<IngestJob>, pool: PgPool, config: Config) {
    let client = match fetch::build_client(config.fetch_timeout) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Ingestion worker disabled: cannot build HTTP client: {}", e);
            return;
        }
    };

    while let Some(job) = rx.recv().await {
        println!("Ingestion triggered via HTTP (force: {})", job.force);
        match ingest::run_ingestion(&pool, &client, &config, "http", job.force).await {
            Ok(report) => println!(
                "Ingestion finished: inserted {}, skipped {}",
                report.rows_inserted, report.rows_skipped
            ),
            Err(e) => eprintln!("Ingestion failed: {}", e),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let bind = std::env::var("API_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let update_secret = std::env::var("UPDATE_SECRET").context("UPDATE_SECRET env var missing")?;

    println!("=== Fuel Price API ===");
    println!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.db_url)
        .await
        .context("Failed to connect to database")?;

    println!("Database connected");

    // Single-slot queue: at most one run queued behind the one in flight
    let (trigger_tx, trigger_rx) = mpsc::channel(1);
    tokio::spawn(ingestion_worker(trigger_rx, pool.clone(), config.clone()));

    let state = Arc::new(AppState {
        pool,
        trigger_tx,
        update_secret,
    });

    // CORS for web frontends
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/prices", get(prices_handler))
        .route("/jobs", get(jobs_handler))
        .route("/trigger-update", post(trigger_handler))
        .layer(cors)
        .with_state(state);

    println!("API listening on http://{}", bind);
    println!("\nEndpoints:");
    println!("  GET  /health");
    println!("  GET  /prices?region=");
    println!("  GET  /jobs?limit=");
    println!("  POST /trigger-update?secret=&force=");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
