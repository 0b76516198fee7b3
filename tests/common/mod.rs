#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use portal_status::api::{self, AppState};
use portal_status::config::ServiceConfig;
use portal_status::models::Status;
use portal_status::probe::Prober;

pub struct TestServer {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub async fn start(state: AppState) -> Self {
        let app = api::create_router(state, "*", Path::new("tests/fixtures/public"))
            .expect("router should build");
        Self::start_router(app).await
    }

    pub async fn start_router(app: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test port");
        let addr = listener.local_addr().expect("local addr");
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(api::serve(listener, app, async move {
            let _ = stopped.await;
        }));
        Self {
            addr,
            stop: Some(stop),
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.task).await;
    }
}

/// Upstream "portal" answering every request with a fixed code.
pub async fn portal(code: axum::http::StatusCode) -> TestServer {
    let app = Router::new().fallback(move || async move { code });
    TestServer::start_router(app).await
}

/// Accepts connections and never answers.
pub async fn black_hole() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

pub struct CountingProber {
    pub answer: Status,
    calls: AtomicUsize,
}

impl CountingProber {
    pub fn new(answer: Status) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for CountingProber {
    async fn probe(&self, _target: &str) -> Status {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

pub fn config(target: &str) -> ServiceConfig {
    ServiceConfig {
        onion_url: target.to_string(),
        proxy: None,
        probe_timeout: Duration::from_millis(300),
        ..ServiceConfig::default()
    }
}
