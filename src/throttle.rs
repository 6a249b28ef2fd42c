//! Per-origin politeness policy
//!
//! At most one request per origin is in flight, and consecutive requests to
//! the same origin are spaced by at least `min_interval`. A single-page run
//! only ever takes one permit, but the policy holds for any caller that
//! shares the throttle.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;
use url::Url;

pub struct OriginThrottle {
    min_interval: Duration,
    slots: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

/// Exclusive right to send one request to an origin
///
/// Dropping the permit stamps the origin's last-request time, which starts
/// the interval the next holder has to wait out.
pub struct OriginPermit {
    guard: OwnedMutexGuard<Option<Instant>>,
}

impl Drop for OriginPermit {
    fn drop(&mut self) {
        *self.guard = Some(Instant::now());
    }
}

impl OriginThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            slots: DashMap::new(),
        }
    }

    /// Wait until `url`'s origin is free and its interval has elapsed
    pub async fn acquire(&self, url: &Url) -> OriginPermit {
        let origin = url.origin().ascii_serialization();
        let slot = self
            .slots
            .entry(origin.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let guard = slot.lock_owned().await;
        if let Some(last) = *guard {
            let ready_at = last + self.min_interval;
            if ready_at > Instant::now() {
                debug!(origin = %origin, "Throttling request to respect minimum interval");
                tokio::time::sleep_until(ready_at).await;
            }
        }

        OriginPermit { guard }
    }
}
