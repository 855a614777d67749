//! # HTTP Service
//!
//! `POST /detect-bpm` runs the detection pipeline for a link and
//! `GET /health` reports liveness. Failures are returned as
//! `{"detail": "..."}` with a status derived from the error kind.

use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    audio::AnalysisResponse,
    detection::DetectionEngine,
    error::{DetectorError, Result},
};

/// Shared state of the HTTP handlers. The engine bounds concurrent analyses.
#[derive(Clone)]
pub struct AppState {
    engine: DetectionEngine,
}

impl AppState {
    pub fn new(engine: DetectionEngine) -> Self {
        Self { engine }
    }
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Errors that render as a JSON `detail` body
pub enum ApiError {
    /// The pipeline failed
    Detection(DetectorError),
    /// The request body was not a valid `{"url": ...}` object
    BadRequest(JsonRejection),
}

impl From<DetectorError> for ApiError {
    fn from(err: DetectorError) -> Self {
        Self::Detection(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Detection(err) => {
                let status = if err.kind().is_client_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, err.user_message())
            }
            Self::BadRequest(rejection) => (rejection.status(), rejection.body_text()),
        };

        (status, Json(ErrorBody { detail })).into_response()
    }
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/detect-bpm", post(detect_bpm))
        .route("/health", get(health))
        .with_state(state)
}

async fn detect_bpm(
    State(state): State<AppState>,
    request: std::result::Result<Json<DetectRequest>, JsonRejection>,
) -> std::result::Result<Json<AnalysisResponse>, ApiError> {
    let Json(request) = request.map_err(|rejection| {
        tracing::warn!("Rejected request body: {}", rejection.body_text());
        rejection
    })?;

    match state.engine.analyze(&request.url).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            tracing::warn!("Request for {} failed ({:?}): {}", request.url, e.kind(), e);
            Err(e.into())
        }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Bind and serve until ctrl-c
pub async fn serve(engine: DetectionEngine, bind: &str) -> Result<()> {
    let addr: SocketAddr = bind.parse().map_err(|_| crate::error::ConfigError::InvalidValue {
        key: "server.bind".to_string(),
        value: bind.to_string(),
    })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🚀 Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(AppState::new(engine)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
