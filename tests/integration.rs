// Copyright 2026 The Refract Project
// SPDX-License-Identifier: Apache-2.0

// Integration tests
//
// End-to-end through the real router with a real ReqwestUpstreamClient
// pointed at a wiremock upstream; tower::ServiceExt::oneshot for
// in-process HTTP. Only the upstream server is mocked.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use refract::config::Config;
use refract::forward::{ReqwestUpstreamClient, UpstreamClient};
use refract::proxy;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Infrastructure
// ---------------------------------------------------------------------------

fn app() -> axum::Router {
    let upstream: Arc<dyn UpstreamClient> =
        Arc::new(ReqwestUpstreamClient::new(reqwest::Client::new()));
    proxy::build_router(upstream, Arc::new(Config::default()))
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_value(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}

// ---------------------------------------------------------------------------
// Buffered path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn buffered_proxy_wraps_upstream_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"answer": 42})))
        .mount(&server)
        .await;

    let response = app()
        .oneshot(get_request(&format!("/proxy?url={}/data", server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_value(response).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["provider"], "ProxyService");
    assert_eq!(body["choices"][0]["message"]["content"], r#"{"answer":42}"#);
    assert_eq!(body["usage"]["total_tokens"], 0);
}

#[tokio::test]
async fn buffered_proxy_forwards_post_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ask"))
        .and(body_json(serde_json::json!({"q": "hi"})))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/proxy?url={}/ask", server.uri()))
        .header("content-type", "application/json")
        .header("authorization", "Bearer token-1")
        .body(Body::from(r#"{"q":"hi"}"#))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn buffered_proxy_propagates_upstream_503() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let response = app()
        .oneshot(get_request(&format!("/proxy?url={}/", server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_value(response).await;
    assert_eq!(body["error"], "Upstream server responded with status 503");
}

#[tokio::test]
async fn unreachable_upstream_returns_500() {
    // Port 9 (discard) is about as reliably closed as it gets.
    let response = app()
        .oneshot(get_request("/proxy?url=http://127.0.0.1:9/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_value(response).await;
    assert_eq!(body["error"], "Failed to proxy request");
}

// ---------------------------------------------------------------------------
// Streaming path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_proxy_relays_and_reframes_sse() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: one\n\ndata: two\n\nevent: ping\n\ndata: three\n\n",
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let response = app()
        .oneshot(get_request(&format!(
            "/proxy/stream?url={}/events",
            server.uri()
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    let body = body_text(response).await;
    assert!(body.contains("event: ping\n"), "pass-through kept: {body}");

    let frames: Vec<serde_json::Value> = body
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .map(|json| serde_json::from_str(json).unwrap())
        .collect();
    assert_eq!(frames.len(), 4, "three chunks plus the summary: {body}");

    for frame in &frames {
        assert_eq!(frame["object"], "chat.completion.chunk");
        assert_eq!(frame["provider"], "Chutes");
        assert_eq!(frame["usage"]["prompt_tokens"], 3134);
    }

    let contents: Vec<&str> = frames
        .iter()
        .map(|f| f["choices"][0]["delta"]["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["one", "two", "three", "one\ntwo\nthree"]);

    assert_eq!(frames[3]["choices"][0]["finish_reason"], "stop");
    for frame in &frames[..3] {
        assert!(frame["choices"][0]["finish_reason"].is_null());
    }
}

#[tokio::test]
async fn stream_proxy_falls_back_to_single_envelope_for_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"plain": "json"})),
        )
        .mount(&server)
        .await;

    let response = app()
        .oneshot(get_request(&format!(
            "/proxy/stream?url={}/",
            server.uri()
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_value(response).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["provider"], "Chutes");
    assert_eq!(body["usage"]["total_tokens"], 3634);
    assert_eq!(body["choices"][0]["message"]["content"], r#"{"plain":"json"}"#);
}

#[tokio::test]
async fn stream_proxy_propagates_upstream_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let response = app()
        .oneshot(get_request(&format!(
            "/proxy/stream?url={}/",
            server.uri()
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_value(response).await;
    assert_eq!(body["error"], "Upstream server responded with status 502");
}
