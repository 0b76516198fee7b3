//! End-to-end tests of the status API over real sockets.

mod common;

use axum::http::StatusCode as UpstreamCode;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{black_hole, config, portal, CountingProber, TestServer};
use portal_status::api::AppState;
use portal_status::clock::{ManualClock, SystemClock};
use portal_status::models::Status;
use portal_status::poller::display::{StatusDisplay, StatusView};
use portal_status::poller::i18n::{self, Language};
use portal_status::poller::store::MemoryStore;
use portal_status::poller::{HttpStatusSource, Poller, PollerConfig};

async fn get_json(url: &str) -> (StatusCode, Value) {
    let response = reqwest::get(url).await.expect("request should complete");
    let status = response.status();
    (status, response.json().await.expect("json body"))
}

#[tokio::test]
async fn reachable_portal_is_online_then_cached() {
    let upstream = portal(UpstreamCode::OK).await;
    let config = config(&upstream.url("/submit"));
    let state = AppState::from_config(&config, Arc::new(SystemClock)).unwrap();
    let server = TestServer::start(state).await;

    let (code, first) = get_json(&server.url("/api/status")).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(first["status"], "online");
    assert_eq!(first["cached"], false);
    assert!(first["timestamp"].as_str().unwrap().contains('T'));

    let (_, second) = get_json(&server.url("/api/status")).await;
    assert_eq!(second["status"], "online");
    assert_eq!(second["cached"], true);

    server.shutdown().await;
    upstream.shutdown().await;
}

#[tokio::test]
async fn failing_portal_is_offline() {
    let upstream = portal(UpstreamCode::BAD_GATEWAY).await;
    let config = config(&upstream.url("/"));
    let state = AppState::from_config(&config, Arc::new(SystemClock)).unwrap();
    let server = TestServer::start(state).await;

    let (code, body) = get_json(&server.url("/api/status")).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "offline");

    server.shutdown().await;
    upstream.shutdown().await;
}

#[derive(Clone, Default)]
struct Lines(Arc<std::sync::Mutex<Vec<StatusView>>>);

impl StatusDisplay for Lines {
    fn render(&mut self, view: &StatusView) {
        self.0.lock().unwrap().push(view.clone());
    }
}

#[tokio::test]
async fn silent_portal_is_offline_within_the_timeout_and_rendered_offline() {
    let hole = black_hole().await;
    let config = config(&format!("http://{hole}/"));
    let state = AppState::from_config(&config, Arc::new(SystemClock)).unwrap();
    let server = TestServer::start(state).await;

    let start = Instant::now();
    let (code, body) = get_json(&server.url("/api/status")).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "offline");
    assert!(start.elapsed() < config.probe_timeout + Duration::from_secs(1));

    let display = Lines::default();
    let source = HttpStatusSource::new(server.url("/api/status"), Duration::from_secs(5)).unwrap();
    let mut poller = Poller::new(
        PollerConfig::new(server.url("/api/status")),
        Arc::new(source),
        display.clone(),
        MemoryStore::new(),
        Arc::new(SystemClock),
    );
    assert_eq!(poller.check_now().await, Status::Offline);

    let last = display.0.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.message, i18n::status_message(Language::En, Status::Offline));

    server.shutdown().await;
}

#[tokio::test]
async fn eleventh_request_in_a_window_is_rejected() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let prober = CountingProber::new(Status::Online);
    let config = config("http://example.onion");
    let state = AppState::with_prober(&config, clock.clone(), prober.clone());
    let server = TestServer::start(state).await;

    for _ in 0..10 {
        let (code, _) = get_json(&server.url("/api/status")).await;
        assert_eq!(code, StatusCode::OK);
    }
    assert_eq!(prober.calls(), 1);

    let response = reqwest::get(server.url("/api/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_header: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Too many requests");
    assert!(body["retryAfter"].as_u64().unwrap() > 0);
    assert_eq!(body["retryAfter"].as_u64().unwrap(), retry_header);

    clock.advance(Duration::from_secs(60));
    let (code, _) = get_json(&server.url("/api/status")).await;
    assert_eq!(code, StatusCode::OK);

    server.shutdown().await;
}

#[tokio::test]
async fn health_is_never_rate_limited() {
    let mut config = config("http://example.onion");
    config.rate_limit_max_requests = 1;
    let state = AppState::with_prober(
        &config,
        Arc::new(SystemClock),
        CountingProber::new(Status::Online),
    );
    let server = TestServer::start(state).await;

    for _ in 0..5 {
        let (code, body) = get_json(&server.url("/health")).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn forwarded_clients_get_their_own_windows_when_trusted() {
    let mut config = config("http://example.onion");
    config.rate_limit_max_requests = 1;
    config.trust_forwarded_for = true;
    let state = AppState::with_prober(
        &config,
        Arc::new(SystemClock),
        CountingProber::new(Status::Online),
    );
    let server = TestServer::start(state).await;
    let client = reqwest::Client::new();

    let send = |ip: &'static str| {
        client
            .get(server.url("/api/status"))
            .header("x-forwarded-for", ip)
            .send()
    };

    assert_eq!(send("203.0.113.7").await.unwrap().status(), StatusCode::OK);
    assert_eq!(send("203.0.113.8, 10.0.0.1").await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        send("203.0.113.7").await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    server.shutdown().await;
}

#[tokio::test]
async fn cors_index_and_static_site_are_served() {
    let state = AppState::with_prober(
        &config("http://example.onion"),
        Arc::new(SystemClock),
        CountingProber::new(Status::Online),
    );
    let server = TestServer::start(state).await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/api/status"))
        .header("origin", "https://leaks.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let (code, index) = get_json(&server.url("/api")).await;
    assert_eq!(code, StatusCode::OK);
    assert!(index["endpoints"]["/api/status"].is_string());

    let page = reqwest::get(server.url("/index.html")).await.unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    assert!(page.text().await.unwrap().contains("onion-status"));

    let missing = reqwest::get(server.url("/nope.html")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    server.shutdown().await;
}
