use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::Clock;

/// Requests seen from one client key in its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at_millis: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Fixed-window counter per client key. Bursts straddling a window boundary
/// can reach twice the nominal rate.
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    clock: Arc<dyn Clock>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>, window: Duration, max_requests: u32) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            window,
            max_requests,
        }
    }

    pub fn allow(&self, client_key: &str) -> RateDecision {
        let now = self.clock.now_millis();
        let window_ms = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
        let reset_at = now.saturating_add(window_ms);

        let mut entry = self
            .entries
            .entry(client_key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_reset_at_millis: reset_at,
            });

        if entry.count == 0 || now >= entry.window_reset_at_millis {
            *entry = RateLimitEntry {
                count: 1,
                window_reset_at_millis: reset_at,
            };
            return RateDecision::Allowed {
                remaining: self.max_requests.saturating_sub(1),
            };
        }

        entry.count = entry.count.saturating_add(1);
        if entry.count <= self.max_requests {
            return RateDecision::Allowed {
                remaining: self.max_requests - entry.count,
            };
        }

        let remaining_ms = entry.window_reset_at_millis.saturating_sub(now).max(0) as u64;
        let retry_after_secs = remaining_ms.div_ceil(1000).max(1);
        debug!(
            "Rate limited {} ({} requests, retry in {}s)",
            client_key, entry.count, retry_after_secs
        );
        RateDecision::Limited { retry_after_secs }
    }

    pub fn entry(&self, client_key: &str) -> Option<RateLimitEntry> {
        self.entries.get(client_key).map(|e| *e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry whose window has already closed. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now < entry.window_reset_at_millis);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Swept {} expired rate limit entries", removed);
        }
        removed
    }

    /// Runs `sweep` every `period` until the returned handle is cancelled or dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> SweepHandle {
        let limiter = Arc::clone(self);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        limiter.sweep();
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        SweepHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

pub struct SweepHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    pub async fn cancel(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("Rate limit sweeper stopped");
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
