//! REST API endpoints.
//!
//! # Concurrency
//!
//! Handlers only ever take the read side of `state.log`, so any number of
//! queries run side by side while the sampler is blocked from appending or
//! compacting. File scans run on the blocking pool with an owned read guard.
//! `/api/history` holds its guard only while opening the log: the response
//! body is paced by the client, and a slow or stalled client must not hold
//! the sampler off. The scan then continues on the open handle, which a
//! compaction's rename leaves pointing at the old file, and appends only ever
//! add whole lines after the point it has reached.
//!
//! # Error Handling
//!
//! Storage problems never surface as 5xx: a log that is missing, unreadable
//! or empty makes `/api/latest` answer `404 {"error":"no_data"}` and
//! `/api/history` answer `200 []`.

use std::io;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use thermolog_store::{HistoryQuery, Since};
use thermolog_types::{Reading, Timestamp};

use crate::state::{AppState, SamplerStats};

/// Target size of one history body chunk.
const HISTORY_CHUNK_BYTES: usize = 4096;

/// Chunks buffered between the file scan and the socket.
const HISTORY_CHANNEL_DEPTH: usize = 4;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/latest", get(latest))
        .route("/api/history", get(history))
        .fallback(not_found)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Whether wall-clock time is valid (readings are being stamped and stored).
    pub clock_synced: bool,
    pub sampler: SamplerHealth,
}

/// Sampler health information.
#[derive(Debug, Serialize)]
pub struct SamplerHealth {
    pub running: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub stats: SamplerStats,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.sampler.stats.read().await.clone();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        clock_synced: state.clock.is_synced(),
        sampler: SamplerHealth {
            running: state.sampler.is_running(),
            started_at: state.sampler.started_at(),
            stats,
        },
    })
}

/// Most recent reading in the log.
async fn latest(State(state): State<Arc<AppState>>) -> Result<Json<Reading>, AppError> {
    let log = Arc::clone(&state.log).read_owned().await;
    let result = tokio::task::spawn_blocking(move || log.latest()).await;

    match result {
        Ok(Ok(Some(reading))) => Ok(Json(reading)),
        Ok(Ok(None)) => Err(AppError::NoData),
        Ok(Err(e)) => {
            warn!("Latest query failed: {}", e);
            Err(AppError::NoData)
        }
        Err(e) => {
            error!("Latest query task failed: {}", e);
            Err(AppError::NoData)
        }
    }
}

/// Query parameters for `/api/history`.
///
/// Values are kept as raw strings and parsed leniently: anything that does not
/// start with an integer reads as `0`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    /// Absolute lower bound (epoch seconds). Takes precedence over `days`.
    pub since: Option<String>,
    /// Relative lookback in days; `<= 0` means seven.
    pub days: Option<String>,
}

impl HistoryParams {
    /// Convert to a store query.
    pub fn to_query(&self) -> HistoryQuery {
        if let Some(since) = &self.since {
            HistoryQuery::new().since(parse_leading_int(since))
        } else if let Some(days) = &self.days {
            HistoryQuery::new().days(parse_leading_int(days))
        } else {
            HistoryQuery::new()
        }
    }
}

/// Readings at or after the requested cutoff, streamed as a JSON array.
async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let cutoff = params
        .to_query()
        .resolve(state.clock.now(), state.config.retention.window());
    debug!("History request {:?} resolved to cutoff {}", params, cutoff);

    let log = Arc::clone(&state.log).read_owned().await;
    let (tx, rx) = mpsc::channel(HISTORY_CHANNEL_DEPTH);
    tokio::task::spawn_blocking(move || {
        let readings = log.since(cutoff);
        drop(log);
        write_history(readings, cutoff, &tx);
    });

    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}

/// Scan the log and push the JSON array to `tx` in chunks.
///
/// Stops early if the receiver is gone (client disconnected).
fn write_history(
    readings: thermolog_store::Result<Since>,
    cutoff: Timestamp,
    tx: &mpsc::Sender<io::Result<Bytes>>,
) {
    let readings = match readings {
        Ok(readings) => Some(readings),
        Err(e) => {
            warn!("History query failed: {}", e);
            None
        }
    };

    let mut chunk = Vec::with_capacity(HISTORY_CHUNK_BYTES + 64);
    chunk.push(b'[');
    let mut count = 0usize;

    for reading in readings.into_iter().flatten() {
        if count > 0 {
            chunk.push(b',');
        }
        if let Err(e) = serde_json::to_writer(&mut chunk, &reading) {
            warn!("Skipping unserializable reading {}: {}", reading, e);
            continue;
        }
        count += 1;

        if chunk.len() >= HISTORY_CHUNK_BYTES {
            let full = std::mem::replace(&mut chunk, Vec::with_capacity(HISTORY_CHUNK_BYTES + 64));
            if tx.blocking_send(Ok(Bytes::from(full))).is_err() {
                debug!("History client went away after {} readings", count);
                return;
            }
        }
    }

    chunk.push(b']');
    if tx.blocking_send(Ok(Bytes::from(chunk))).is_ok() {
        debug!("Streamed {} readings since {}", count, cutoff);
    }
}

/// Parse the leading integer of `s`, the way C's `atol` does.
///
/// Leading whitespace and one sign are accepted; parsing stops at the first
/// non-digit. No digits at all yields `0`. Overflow saturates.
fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            acc.saturating_mul(10).saturating_add(i64::from(d - b'0'))
        });

    if negative { -value } else { value }
}

async fn not_found() -> AppError {
    AppError::NotFound("not_found")
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// The log holds no readable record.
    NoData,
    NotFound(&'static str),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NoData => (StatusCode::NOT_FOUND, "no_data"),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
