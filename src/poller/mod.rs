//! Client side of the status API: polls it, renders the answer in the chosen
//! language, and remembers the last answer and the language between runs.

pub mod display;
pub mod i18n;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::models::{millis_to_datetime, Status};
use display::{StatusDisplay, StatusView};
use i18n::Language;
use store::LocalStore;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub endpoint: String,
    pub check_interval: Duration,
    pub request_timeout: Duration,
    /// How long a locally cached status may be shown before the first check.
    pub cache_ttl: Duration,
    pub enabled: bool,
}

impl PollerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            check_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(15),
            cache_ttl: Duration::from_secs(180),
            enabled: true,
        }
    }
}

/// Where the poller gets its answer from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Never fails: anything but an explicit `online` is `offline`.
    async fn fetch(&self) -> Status;
}

#[derive(Deserialize)]
struct RemoteStatus {
    status: String,
}

/// Reads `{"status": ...}` from the status API (or a static status.json).
pub struct HttpStatusSource {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpStatusSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    pub fn from_config(config: &PollerConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.endpoint.clone(), config.request_timeout)
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self) -> Status {
        let request = self
            .client
            .get(&self.endpoint)
            .header(ACCEPT, "application/json")
            .send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                info!("Status check failed: {}", e);
                return Status::Offline;
            }
            Err(_) => {
                info!("Status check timed out after {:?}", self.timeout);
                return Status::Offline;
            }
        };

        if !response.status().is_success() {
            info!("Status check failed: HTTP {}", response.status());
            return Status::Offline;
        }

        match response.json::<RemoteStatus>().await {
            Ok(body) if body.status == "online" => Status::Online,
            Ok(_) => Status::Offline,
            Err(e) => {
                info!("Status check returned an unreadable body: {}", e);
                Status::Offline
            }
        }
    }
}

pub struct Poller<D, S> {
    config: PollerConfig,
    source: Arc<dyn StatusSource>,
    display: D,
    store: S,
    clock: Arc<dyn Clock>,
    language: Language,
    current: Status,
    last_checked: Option<DateTime<Local>>,
}

impl<D: StatusDisplay, S: LocalStore> Poller<D, S> {
    pub fn new(
        config: PollerConfig,
        source: Arc<dyn StatusSource>,
        display: D,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let language = store::load_language(&store);
        Self {
            config,
            source,
            display,
            store,
            clock,
            language,
            current: Status::Unknown,
            last_checked: None,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn current_status(&self) -> Status {
        self.current
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Shows a still-fresh locally cached status right away, then checks.
    pub async fn mount(&mut self) {
        if !self.config.enabled {
            self.display.render(&StatusView::disabled(self.language));
            return;
        }
        self.show_cached();
        self.check_now().await;
    }

    pub async fn check_now(&mut self) -> Status {
        self.show(Status::Checking);

        let status = self.source.fetch().await;
        let now = self.clock.now_millis();
        self.last_checked = Some(millis_to_datetime(now).with_timezone(&Local));
        self.current = status;
        self.show(status);
        store::save_cached_status(&mut self.store, status, now);

        debug!("Portal status: {}", status);
        status
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
        store::save_language(&mut self.store, language);
        self.show(self.current);
    }

    pub fn toggle_language(&mut self) -> Language {
        let next = self.language.toggle();
        self.set_language(next);
        next
    }

    /// Polls until `shutdown` resolves. No checks are made while `visible`
    /// reads false; turning visible again checks immediately and restarts
    /// the interval. Each message on `refresh` does the same while visible
    /// and is dropped while hidden.
    pub async fn run<F>(
        &mut self,
        mut visible: watch::Receiver<bool>,
        mut refresh: mpsc::Receiver<()>,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        if !self.config.enabled {
            self.display.render(&StatusView::disabled(self.language));
            return;
        }

        tokio::pin!(shutdown);
        let period = self.config.check_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if *visible.borrow_and_update() {
            self.mount().await;
        } else {
            self.show_cached();
        }

        let mut watching = true;
        let mut refreshable = true;
        loop {
            let is_visible = *visible.borrow_and_update();
            let receiver = &mut visible;
            let visibility_changed = async move {
                if watching {
                    receiver.changed().await.is_ok()
                } else {
                    std::future::pending().await
                }
            };

            if is_visible {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => {
                        self.check_now().await;
                    }
                    request = refresh.recv(), if refreshable => match request {
                        Some(()) => {
                            info!("Manual refresh");
                            self.check_now().await;
                            ticker.reset();
                        }
                        None => refreshable = false,
                    },
                    still_watching = visibility_changed => {
                        watching = still_watching;
                    }
                }
            } else {
                tokio::select! {
                    _ = &mut shutdown => break,
                    request = refresh.recv(), if refreshable => match request {
                        Some(()) => debug!("Refresh ignored while hidden"),
                        None => refreshable = false,
                    },
                    still_watching = visibility_changed => {
                        watching = still_watching;
                        if *visible.borrow_and_update() {
                            info!("Visible again, checking now");
                            self.check_now().await;
                            ticker.reset();
                        } else if !watching {
                            // Nobody can make us visible again.
                            break;
                        }
                    }
                }
            }
        }
        info!("Status polling stopped");
    }

    fn show_cached(&mut self) {
        let now = self.clock.now_millis();
        if let Some(cached) = store::load_cached_status(&self.store, now, self.config.cache_ttl) {
            self.current = cached;
            self.show(cached);
        }
    }

    fn show(&mut self, status: Status) {
        let view = StatusView::new(status, self.language, self.last_checked);
        self.display.render(&view);
    }
}
