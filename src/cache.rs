use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::trace;

use crate::clock::Clock;
use crate::models::{Status, StatusRecord};

/// Holds the single authoritative `StatusRecord` of the process and decides
/// whether it is still fresh enough to serve.
pub struct StatusCache {
    record: RwLock<StatusRecord>,
    clock: Arc<dyn Clock>,
    cache_duration: Duration,
}

impl StatusCache {
    pub fn new(clock: Arc<dyn Clock>, cache_duration: Duration) -> Self {
        Self {
            record: RwLock::new(StatusRecord::default()),
            clock,
            cache_duration,
        }
    }

    /// Returns a snapshot of the stored record and whether it is within the
    /// freshness window. A record that was never observed is always stale.
    pub async fn get_status(&self) -> (StatusRecord, bool) {
        let record = *self.record.read().await;
        if !record.has_been_observed() {
            return (record, false);
        }

        let elapsed = self.clock.now_millis().saturating_sub(record.observed_at_millis);
        let fresh = elapsed >= 0 && (elapsed as u128) < self.cache_duration.as_millis();
        trace!(status = %record.status, elapsed, fresh, "status cache lookup");
        (record, fresh)
    }

    pub async fn set_status(&self, status: Status) -> StatusRecord {
        let record = StatusRecord {
            status,
            observed_at_millis: self.clock.now_millis(),
        };
        *self.record.write().await = record;
        record
    }

    pub async fn record(&self) -> StatusRecord {
        *self.record.read().await
    }
}
