use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::cache::StatusCache;
use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::engine::Monitor;
use crate::error::{AppError, ConfigError};
use crate::models::{millis_to_datetime, HealthResponse, ServiceIndex, StatusResponse};
use crate::probe::{Prober, TorProber};
use crate::rate_limit::{RateDecision, RateLimiter};

pub const SERVICE_NAME: &str = "Portal Status Checker";

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub limiter: Arc<RateLimiter>,
    pub clock: Arc<dyn Clock>,
    pub started: Instant,
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>, limiter: Arc<RateLimiter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            monitor,
            limiter,
            clock,
            started: Instant::now(),
            trust_forwarded_for: false,
        }
    }

    /// Wires cache, prober and limiter from configuration.
    pub fn from_config(config: &ServiceConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let prober: Arc<dyn Prober> =
            Arc::new(TorProber::new(config.proxy.clone(), config.probe_timeout)?);
        Ok(Self::with_prober(config, clock, prober))
    }

    pub fn with_prober(config: &ServiceConfig, clock: Arc<dyn Clock>, prober: Arc<dyn Prober>) -> Self {
        let cache = StatusCache::new(Arc::clone(&clock), config.cache_duration);
        let monitor = Arc::new(Monitor::new(cache, prober, config.onion_url.clone()));
        let limiter = Arc::new(RateLimiter::new(
            Arc::clone(&clock),
            config.rate_limit_window,
            config.rate_limit_max_requests,
        ));

        let mut state = Self::new(monitor, limiter, clock);
        state.trust_forwarded_for = config.trust_forwarded_for;
        state
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let observation = state.monitor.current_status().await;
    Json(StatusResponse {
        status: observation.status,
        timestamp: millis_to_datetime(state.clock.now_millis()),
        cached: observation.cached,
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        service: SERVICE_NAME.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime: state.started.elapsed().as_secs_f64(),
    })
}

pub async fn service_index() -> Json<ServiceIndex> {
    let endpoints = BTreeMap::from([
        ("/api/status".to_string(), "Check onion portal status".to_string()),
        ("/health".to_string(), "Health check".to_string()),
    ]);
    Json(ServiceIndex {
        service: format!("{SERVICE_NAME} API"),
        version: env!("CARGO_PKG_VERSION").into(),
        endpoints,
    })
}

async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = client_key(&request, state.trust_forwarded_for)
        .ok_or_else(|| AppError::Internal("client address unavailable".into()))?;

    match state.limiter.allow(&key) {
        RateDecision::Allowed { .. } => Ok(next.run(request).await),
        RateDecision::Limited { retry_after_secs } => {
            Err(AppError::RateLimited { retry_after_secs })
        }
    }
}

fn client_key(request: &Request, trust_forwarded_for: bool) -> Option<String> {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn cors_layer(origin: &str) -> Result<CorsLayer, ConfigError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    if origin.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origin
        .split(',')
        .map(|o| {
            HeaderValue::from_str(o.trim()).map_err(|e| ConfigError::Invalid {
                key: "CORS_ORIGIN",
                value: origin.to_string(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

pub fn create_router(
    state: AppState,
    cors_origin: &str,
    static_dir: &Path,
) -> Result<Router, ConfigError> {
    let limited_status =
        get(get_status).layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Ok(Router::new()
        .route("/api/status", limited_status)
        .route("/api", get(service_index))
        .route("/health", get(health))
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors_layer(cors_origin)?)
        .with_state(state))
}

/// Serves `app` with peer addresses attached, until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

pub async fn start_server<F>(config: &ServiceConfig, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state, &config.cors_origin, &config.static_dir)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Status API: http://localhost:{}/api/status", addr.port());
    serve(listener, app, shutdown).await?;
    Ok(())
}
