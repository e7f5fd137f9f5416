//! HTTP query surface and ingestion adapter.
//!
//! This module provides an HTTP server that:
//! - Answers per-zone feature and decision queries, computed fresh per call
//! - Reports liveness (zone count, ingest and sampling counters)
//! - Accepts telemetry via POST /ingest and hands it to the ingestion thread
//!
//! # Architecture
//!
//! ```text
//! sensor ──→ POST /ingest ──→ [validate] ──→ ingest channel ──→ ingestion thread
//!                                                                   ↓
//! client ←── GET /zones/:id/decision ←── ZoneEngine ←──────── WindowStore
//! ```

use crate::engine::{Liveness, ZoneDecision, ZoneEngine};
use crate::core::{FeatureVector, Unavailable};
use crate::telemetry::TelemetryRecord;
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: IpAddr,
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    /// Loopback server on `port`.
    pub fn new(port: u16) -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
        }
    }
}

/// Shared server state
pub struct ServerState {
    engine: Arc<ZoneEngine>,
    ingest_tx: Sender<TelemetryRecord>,
}

impl ServerState {
    pub fn new(engine: Arc<ZoneEngine>, ingest_tx: Sender<TelemetryRecord>) -> Self {
        Self { engine, ingest_tx }
    }
}

/// Banner for GET /
#[derive(Serialize)]
pub struct BannerResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct ZonesResponse {
    pub zones: Vec<String>,
}

#[derive(Serialize)]
pub struct FeaturesResponse {
    pub zone_id: String,
    pub features: FeatureVector,
}

/// Response from ingest endpoint
#[derive(Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub zone_id: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, zone_id: Option<String>, error: String, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            zone_id,
            error,
            code: code.to_string(),
        }),
    )
}

/// Map an unavailable result to its HTTP form. Only a failing model is a
/// server-side condition; everything else is "not there yet".
fn unavailable(zone_id: String, reason: Unavailable) -> ApiError {
    let status = match reason {
        Unavailable::ModelFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::NOT_FOUND,
    };
    error(status, Some(zone_id), reason.to_string(), reason.code())
}

/// GET /
async fn root() -> Json<BannerResponse> {
    Json(BannerResponse {
        name: "pastureflow",
        version: crate::VERSION,
        message: "PastureFlow intelligence API running",
    })
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<Liveness> {
    Json(state.engine.liveness())
}

/// GET /zones
async fn zones(State(state): State<Arc<ServerState>>) -> Json<ZonesResponse> {
    Json(ZonesResponse {
        zones: state.engine.zone_ids(),
    })
}

/// GET /zones/:zone_id/features
async fn features(
    State(state): State<Arc<ServerState>>,
    Path(zone_id): Path<String>,
) -> Result<Json<FeaturesResponse>, ApiError> {
    match state.engine.features(&zone_id) {
        Ok(features) => Ok(Json(FeaturesResponse { zone_id, features })),
        Err(reason) => Err(unavailable(zone_id, reason)),
    }
}

/// GET /zones/:zone_id/decision
async fn decision(
    State(state): State<Arc<ServerState>>,
    Path(zone_id): Path<String>,
) -> Result<Json<ZoneDecision>, ApiError> {
    state
        .engine
        .decision(&zone_id)
        .map(Json)
        .map_err(|reason| unavailable(zone_id, reason))
}

/// POST /ingest
///
/// Validates one record and queues it for the ingestion thread. The body is
/// parsed by hand so malformed input gets the same JSON error shape as every
/// other failure.
async fn ingest(
    State(state): State<Arc<ServerState>>,
    body: String,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let record = TelemetryRecord::from_json(&body).map_err(|e| {
        tracing::debug!("Rejected ingest body: {}", e);
        error(StatusCode::BAD_REQUEST, None, e.to_string(), "MALFORMED_INPUT")
    })?;

    let zone_id = record.zone_id.clone();
    match state.ingest_tx.try_send(record) {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(IngestResponse {
                status: "accepted",
                zone_id,
            }),
        )),
        Err(TrySendError::Full(_)) => Err(error(
            StatusCode::SERVICE_UNAVAILABLE,
            Some(zone_id),
            "Ingestion queue full, retry later".to_string(),
            "INGEST_BACKPRESSURE",
        )),
        Err(TrySendError::Disconnected(_)) => Err(error(
            StatusCode::SERVICE_UNAVAILABLE,
            Some(zone_id),
            "Ingestion stopped".to_string(),
            "INGEST_STOPPED",
        )),
    }
}

/// Build the router without binding it.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/zones", get(zones))
        .route("/zones/:zone_id/features", get(features))
        .route("/zones/:zone_id/decision", get(decision))
        .route("/ingest", post(ingest))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    engine: Arc<ZoneEngine>,
    ingest_tx: Sender<TelemetryRecord>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(Arc::new(ServerState::new(engine, ingest_tx)));

    let addr = SocketAddr::new(config.bind, config.port);
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("PastureFlow server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
