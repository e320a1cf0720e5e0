//! HTTP surface
//!
//! Thin JSON handlers over [`Pipeline`] and the order gateway. Failures are
//! reported as `{"error": message}`: signature and request-shape problems as
//! 400, everything else as 500.

use crate::config::MetricsFormat;
use crate::error::{Error, Result};
use crate::metrics;
use crate::payment::{EntitlementProof, OrderGateway};
use crate::pipeline::{Generated, Pipeline};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    gateway: Arc<dyn OrderGateway>,
    metrics_format: MetricsFormat,
}

impl AppState {
    /// Bundle the pipeline and gateway for the router
    pub fn new(
        pipeline: Arc<Pipeline>,
        gateway: Arc<dyn OrderGateway>,
        metrics_format: MetricsFormat,
    ) -> Self {
        Self {
            pipeline,
            gateway,
            metrics_format,
        }
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/generate/standard",
            post(generate_standard).options(preflight),
        )
        .route("/generate/ai", post(generate_ai).options(preflight))
        .route("/create-order", post(create_order).options(preflight))
        .route("/verify-payment", post(verify_payment).options(preflight))
        .route("/regenerate", post(regenerate).options(preflight))
        .route("/metrics", get(metrics_endpoint))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "qrgate listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Error::Io)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// JSON error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::SignatureInvalid => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
struct StandardRequest {
    url: String,
}

#[derive(Debug, Deserialize)]
struct AiRequest {
    url: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OrderRequest {
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    razorpay_order_id: String,
    razorpay_payment_id: String,
    razorpay_signature: String,
    art_id: String,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    success: bool,
    download_url: String,
}

async fn generate_standard(
    State(state): State<AppState>,
    payload: std::result::Result<Json<StandardRequest>, JsonRejection>,
) -> ApiResult<Generated> {
    let Json(request) = payload?;
    Ok(Json(state.pipeline.generate_standard(&request.url).await?))
}

async fn generate_ai(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AiRequest>, JsonRejection>,
) -> ApiResult<Generated> {
    let Json(request) = payload?;
    Ok(Json(
        state
            .pipeline
            .generate_ai(&request.url, &request.prompt)
            .await?,
    ))
}

async fn create_order(
    State(state): State<AppState>,
    payload: std::result::Result<Json<OrderRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = payload?;
    Ok(Json(state.gateway.create_order(request.amount).await?))
}

async fn verify_payment(
    State(state): State<AppState>,
    payload: std::result::Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<VerifyResponse> {
    let Json(request) = payload?;
    let proof = EntitlementProof {
        order_id: request.razorpay_order_id,
        payment_id: request.razorpay_payment_id,
        signature: request.razorpay_signature,
    };

    let download_url = state
        .pipeline
        .unlock(&proof, &request.art_id)
        .map_err(|err| ApiError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    Ok(Json(VerifyResponse {
        success: true,
        download_url,
    }))
}

/// Reserved for invalidating an artifact; acknowledges without side effects.
async fn regenerate() -> Json<Value> {
    Json(json!({ "success": true }))
}

async fn preflight() -> impl IntoResponse {
    (
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type,Authorization"),
            (ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
        ],
        Json(json!({ "status": "ok" })),
    )
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let (content_type, body) = metrics::render(state.metrics_format);
    ([(CONTENT_TYPE, content_type)], body)
}
