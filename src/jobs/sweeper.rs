//! Background jobs: timeout sweep and retention purge.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::broker::SYSTEM_DECIDER;
use crate::middleware::rate_limit::RateLimiter;
use crate::models::request::RequestStatus;
use crate::notification::webhook::dispatch_audit;
use crate::notification::{AuditEvent, NotificationChannel};
use crate::store::{RequestStore, TransitionError};

/// Spawn the timeout sweeper. Call this once at startup; it runs for the
/// lifetime of the process.
pub fn spawn_timeout_sweeper(
    store: Arc<RequestStore>,
    notifier: Arc<dyn NotificationChannel>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            sweep_expired(&store, &notifier);
        }
    });
}

/// Force-transition every stale pending record to TimedOut. Losing a race
/// to a human decision is expected and non-fatal.
fn sweep_expired(store: &RequestStore, notifier: &Arc<dyn NotificationChannel>) {
    let now = Utc::now();
    for id in store.expired_pending(now) {
        match store.transition(&id, RequestStatus::TimedOut, SYSTEM_DECIDER) {
            Ok(snapshot) => {
                tracing::info!(request_id = %id, "request timed out");
                dispatch_audit(notifier, AuditEvent::timed_out(&snapshot));
            }
            Err(TransitionError::AlreadyDecided) => {
                // A decision arrived between the scan and the transition.
                tracing::debug!(request_id = %id, "timeout sweep lost race to a decision");
            }
            Err(e) => {
                tracing::warn!(request_id = %id, error = %e, "timeout sweep transition failed");
            }
        }
    }
}

/// Spawn the retention purge for decided records. Separate cadence from
/// the sweeper; removal is housekeeping, not lifecycle.
pub fn spawn_retention_purge(store: Arc<RequestStore>, interval: Duration, retention: Duration) {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::seconds(900));
        loop {
            ticker.tick().await;
            let removed = store.purge_decided_before(Utc::now() - retention);
            if removed > 0 {
                tracing::info!(removed, "purged decided requests past retention");
            }
        }
    });
}

/// Spawn the rate-limiter purge. Without it the per-client counter table
/// grows by one entry per distinct client forever; stale windows are
/// reclaimed once per window length.
pub fn spawn_limiter_purge(limiter: Arc<RateLimiter>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = limiter.purge_stale();
            if removed > 0 {
                tracing::debug!(removed, "purged stale rate-limit windows");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::webhook::WebhookChannel;

    fn notifier() -> Arc<dyn NotificationChannel> {
        Arc::new(WebhookChannel::new(None, None))
    }

    #[tokio::test]
    async fn test_sweep_times_out_stale_pending() {
        let store = Arc::new(RequestStore::new(Duration::from_secs(0)));
        let snap = store.create("svc", "ro", "r", "x");

        sweep_expired(&store, &notifier());

        let swept = store.read(&snap.id).unwrap();
        assert_eq!(swept.status, RequestStatus::TimedOut);
        assert_eq!(swept.decided_by.as_deref(), Some(SYSTEM_DECIDER));
    }

    #[tokio::test]
    async fn test_sweep_leaves_fresh_pending_alone() {
        let store = Arc::new(RequestStore::new(Duration::from_secs(600)));
        let snap = store.create("svc", "ro", "r", "x");

        sweep_expired(&store, &notifier());

        assert_eq!(store.read(&snap.id).unwrap().status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_sweep_tolerates_decided_records() {
        let store = Arc::new(RequestStore::new(Duration::from_secs(0)));
        let snap = store.create("svc", "ro", "r", "x");
        store.transition(&snap.id, RequestStatus::Approved, "alice").unwrap();

        // Must not panic or overwrite the human decision.
        sweep_expired(&store, &notifier());
        assert_eq!(store.read(&snap.id).unwrap().status, RequestStatus::Approved);
    }
}
