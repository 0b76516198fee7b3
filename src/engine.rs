use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::StatusCache;
use crate::models::{Status, StatusRecord};
use crate::probe::Prober;

/// Result of one status lookup. `cached` is true when no probe ran for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub status: Status,
    pub cached: bool,
    pub observed_at_millis: i64,
}

pub struct Monitor {
    cache: StatusCache,
    prober: Arc<dyn Prober>,
    target: String,
}

impl Monitor {
    pub fn new(cache: StatusCache, prober: Arc<dyn Prober>, target: impl Into<String>) -> Self {
        Self {
            cache,
            prober,
            target: target.into(),
        }
    }

    /// Serves the cached status while fresh, otherwise probes and stores the
    /// result. Concurrent callers on a stale cache may each probe; the last
    /// write wins.
    pub async fn current_status(&self) -> Observation {
        let (record, fresh) = self.cache.get_status().await;
        if fresh {
            return Observation {
                status: record.status,
                cached: true,
                observed_at_millis: record.observed_at_millis,
            };
        }

        let status = self.run_probe().await;
        let record = self.cache.set_status(status).await;
        info!("Status of {}: {}", self.target, status);

        Observation {
            status: record.status,
            cached: false,
            observed_at_millis: record.observed_at_millis,
        }
    }

    pub async fn record(&self) -> StatusRecord {
        self.cache.record().await
    }

    async fn run_probe(&self) -> Status {
        let prober = Arc::clone(&self.prober);
        let target = self.target.clone();

        match tokio::spawn(async move { prober.probe(&target).await }).await {
            Ok(Status::Online) => Status::Online,
            Ok(other) => {
                if other != Status::Offline {
                    warn!("Prober returned non-terminal status {}, treating as offline", other);
                }
                Status::Offline
            }
            Err(e) => {
                error!("Probe task for {} failed: {}", self.target, e);
                Status::Offline
            }
        }
    }
}
