// Copyright 2026 The Refract Project
// SPDX-License-Identifier: Apache-2.0

// Request forwarding
//
// Responsibilities:
// - Build the outbound request: hop-by-hop header stripping, method chosen
//   by body presence, absolute-URL validation
// - Issue it via the injected UpstreamClient trait
// - Expose the upstream response as buffered bytes or a live byte stream

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};

use crate::config::UpstreamConfig;

/// Inbound headers never copied onto the outbound request.
/// Matched case-insensitively (HeaderMap keys are already lowercase).
const HOP_HEADERS: &[&str] = &["host", "connection", "content-length"];

// ---------------------------------------------------------------------------
// Outbound request
// ---------------------------------------------------------------------------

/// The outbound request, immutable once built; lives for one client request.
#[derive(Debug, Clone)]
pub struct ForwardedRequest {
    pub method: Method,
    pub url: reqwest::Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// The caller-supplied target did not parse as an absolute URL.
#[derive(Debug, thiserror::Error)]
#[error("invalid target URL \"{target}\": {reason}")]
pub struct InvalidTarget {
    pub target: String,
    pub reason: String,
}

impl ForwardedRequest {
    /// Build the outbound request from the inbound one.
    ///
    /// The target must parse as an absolute URL; no upstream call is made
    /// for an invalid one. Method is GET without a body, POST with one,
    /// and a body always travels as JSON.
    pub fn build(
        target: &str,
        inbound_headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> Result<Self, InvalidTarget> {
        let url = reqwest::Url::parse(target).map_err(|e| InvalidTarget {
            target: target.to_string(),
            reason: e.to_string(),
        })?;

        let mut headers = inbound_headers.clone();
        for name in HOP_HEADERS {
            headers.remove(*name);
        }

        let method = if body.is_some() {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            Method::POST
        } else {
            Method::GET
        };

        Ok(Self {
            method,
            url,
            headers,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Upstream response
// ---------------------------------------------------------------------------

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// Response body: fully buffered, or a continuous byte stream.
/// Exactly one consumer takes ownership.
pub enum UpstreamBody {
    Full(Bytes),
    Stream(ByteStream),
}

impl UpstreamBody {
    /// Drain the body into one buffer (the buffered proxy path).
    pub async fn collect(self) -> Result<Bytes, UpstreamError> {
        match self {
            UpstreamBody::Full(bytes) => Ok(bytes),
            UpstreamBody::Stream(mut stream) => {
                let mut collected = Vec::new();
                while let Some(chunk) = stream.next().await {
                    collected.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(collected))
            }
        }
    }

    /// The streaming half, converting an already-buffered body into a
    /// single-chunk stream when a mock or test hands us one.
    pub fn into_stream(self) -> ByteStream {
        match self {
            UpstreamBody::Stream(stream) => stream,
            UpstreamBody::Full(bytes) => Box::pin(futures_util::stream::once(async move {
                Ok::<_, UpstreamError>(bytes)
            })),
        }
    }
}

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    /// Content-type fork: does this response carry an SSE stream?
    pub fn is_event_stream(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/event-stream"))
            .unwrap_or(false)
    }
}

/// Errors from upstream transport.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream request timed out: {0}")]
    Timeout(String),
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Abstraction over the HTTP client that issues forwarded requests.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, request: ForwardedRequest) -> Result<UpstreamResponse, UpstreamError>;
}

// ---------------------------------------------------------------------------
// Reqwest client
// ---------------------------------------------------------------------------

pub struct ReqwestUpstreamClient {
    client: reqwest::Client,
}

impl ReqwestUpstreamClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client with the configured connect/read timeouts applied.
    /// Both default to none.
    pub fn from_config(config: &UpstreamConfig) -> reqwest::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = config.read_timeout_ms {
            builder = builder.read_timeout(Duration::from_millis(ms));
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
    async fn send(&self, request: ForwardedRequest) -> Result<UpstreamResponse, UpstreamError> {
        let mut req = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            req = req.body(body);
        }

        let resp = req.send().await.map_err(classify_error)?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let stream = resp.bytes_stream().map_err(classify_error);

        Ok(UpstreamResponse {
            status,
            headers,
            body: UpstreamBody::Stream(Box::pin(stream)),
        })
    }
}

fn classify_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout(e.to_string())
    } else {
        UpstreamError::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
