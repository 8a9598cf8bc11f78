// Copyright 2026 The Refract Project
// SPDX-License-Identifier: Apache-2.0

// HTTP proxy surface
//
// Responsibilities:
// - /proxy: buffered JSON pass-through wrapped in a completion envelope
// - /proxy/stream: SSE relay with per-event re-framing, JSON fallback
// - Fixed CORS headers on every response, preflight handling
// - Root service descriptor and heartbeat endpoints

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::envelope::{Formatter, Usage};
use crate::forward::{ForwardedRequest, UpstreamClient};
use crate::relay::RelayEngine;

/// Cap on inbound request bodies read into memory.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    upstream: Arc<dyn UpstreamClient>,
    buffered: Formatter,
    stream: Formatter,
    relay_channel_capacity: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced to the caller as structured JSON bodies.
///
/// Mid-stream failures never appear here — once SSE headers are committed
/// they propagate as an abrupt stream abort instead (see relay).
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("URL parameter is required")]
    MissingUrl,

    #[error("invalid JSON in request body: {0}")]
    InvalidBody(String),

    #[error("upstream server responded with status {0}")]
    UpstreamStatus(StatusCode),

    #[error("failed to proxy request: {0}")]
    Failed(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ProxyError::MissingUrl => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "URL parameter is required" }),
            ),
            ProxyError::InvalidBody(details) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid JSON in request body", "details": details }),
            ),
            ProxyError::UpstreamStatus(code) => (
                *code,
                json!({
                    "error": format!("Upstream server responded with status {}", code.as_u16())
                }),
            ),
            ProxyError::Failed(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Failed to proxy request", "details": details }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request preparation (shared by both endpoints)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProxyParams {
    url: Option<String>,
}

/// Validate the query parameter and inbound body, then build the outbound
/// request. Every failure here happens before any upstream call.
async fn prepare(params: ProxyParams, request: Request) -> Result<ForwardedRequest, ProxyError> {
    let target = params.url.ok_or(ProxyError::MissingUrl)?;

    let method = request.method().clone();
    let headers = request.headers().clone();

    let body = if method == Method::POST {
        let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| ProxyError::InvalidBody(format!("failed to read request body: {e}")))?;
        if let Err(e) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            return Err(ProxyError::InvalidBody(e.to_string()));
        }
        Some(bytes)
    } else {
        None
    };

    ForwardedRequest::build(&target, &headers, body).map_err(|e| ProxyError::Failed(e.to_string()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Buffered pass-through: upstream must answer JSON, the caller gets one
/// completion envelope carrying it.
async fn proxy_buffered(
    State(state): State<AppState>,
    Query(params): Query<ProxyParams>,
    request: Request,
) -> Result<Response, ProxyError> {
    let request_id = Uuid::new_v4().to_string();
    let forwarded = prepare(params, request).await?;

    tracing::debug!(
        request_id = %request_id,
        method = %forwarded.method,
        target = %forwarded.url,
        "forwarding buffered request"
    );

    let upstream = state
        .upstream
        .send(forwarded)
        .await
        .map_err(|e| ProxyError::Failed(e.to_string()))?;

    if !upstream.status.is_success() {
        tracing::info!(
            request_id = %request_id,
            status = %upstream.status,
            "upstream responded with non-success status"
        );
        return Err(ProxyError::UpstreamStatus(upstream.status));
    }

    let body = upstream
        .body
        .collect()
        .await
        .map_err(|e| ProxyError::Failed(e.to_string()))?;
    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::Failed(format!("upstream response is not valid JSON: {e}")))?;

    Ok(Json(state.buffered.buffered(&payload)).into_response())
}

/// Streaming pass-through: an SSE upstream is relayed frame by frame; any
/// other upstream falls back to one buffered-form envelope.
async fn proxy_stream(
    State(state): State<AppState>,
    Query(params): Query<ProxyParams>,
    request: Request,
) -> Result<Response, ProxyError> {
    let request_id = Uuid::new_v4().to_string();
    let forwarded = prepare(params, request).await?;

    tracing::debug!(
        request_id = %request_id,
        method = %forwarded.method,
        target = %forwarded.url,
        "forwarding stream request"
    );

    let upstream = state
        .upstream
        .send(forwarded)
        .await
        .map_err(|e| ProxyError::Failed(e.to_string()))?;

    if !upstream.status.is_success() {
        tracing::info!(
            request_id = %request_id,
            status = %upstream.status,
            "upstream responded with non-success status"
        );
        return Err(ProxyError::UpstreamStatus(upstream.status));
    }

    if upstream.is_event_stream() {
        tracing::debug!(request_id = %request_id, "relaying upstream event stream");

        let engine = RelayEngine::new(state.stream.clone(), state.relay_channel_capacity);
        let frames = engine.relay(upstream.body.into_stream());

        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::from_stream(frames))
            .map_err(|e| ProxyError::Failed(e.to_string()));
    }

    // Non-SSE upstream on the stream path: single envelope, stream labels.
    let body = upstream
        .body
        .collect()
        .await
        .map_err(|e| ProxyError::Failed(e.to_string()))?;
    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::Failed(format!("upstream response is not valid JSON: {e}")))?;

    Ok(Json(state.stream.buffered(&payload)).into_response())
}

/// CORS preflight: 204 with a 24h max-age. The shared allow headers are
/// appended by the middleware like on every other response.
async fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    response
}

/// Service descriptor for the root path.
async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "service": "refract",
        "endpoints": {
            "proxy": "/proxy?url=<absolute-url>",
            "stream": "/proxy/stream?url=<absolute-url>",
        },
    }))
}

/// Heartbeat endpoint: GET /heartbeat -> 200 OK
async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// Append the fixed CORS headers to every response, error paths included.
async fn apply_cors(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router with both proxy routes and the utility endpoints.
///
/// The upstream client is injected — no side effects, no hard-coded clients.
pub fn build_router(upstream: Arc<dyn UpstreamClient>, config: Arc<Config>) -> Router {
    let state = AppState {
        upstream,
        buffered: Formatter::new(
            config.buffered.provider.clone(),
            config.buffered.model.clone(),
            Usage::ZERO,
        ),
        stream: Formatter::new(
            config.stream.provider.clone(),
            config.stream.model.clone(),
            config.stream_usage,
        ),
        relay_channel_capacity: config.relay_channel_capacity,
    };

    Router::new()
        .route("/", get(index))
        .route("/heartbeat", get(heartbeat))
        .route(
            "/proxy",
            get(proxy_buffered).post(proxy_buffered).options(preflight),
        )
        .route(
            "/proxy/stream",
            get(proxy_stream).post(proxy_stream).options(preflight),
        )
        .layer(middleware::from_fn(apply_cors))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
