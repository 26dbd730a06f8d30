pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;

use crate::models::request::RequestSnapshot;

// ── Audit Events ──────────────────────────────────────────────

/// Structured audit event posted to the audit channel on every lifecycle
/// edge. Internal only: audit distinguishes denial from timeout even
/// though the pickup wire response does not.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Event type identifier, e.g. "request_submitted", "request_denied".
    pub event_type: String,
    /// ISO-8601 timestamp of when the event occurred.
    pub timestamp: String,
    pub request_id: String,
    pub service: String,
    pub scope: String,
    /// Event-specific details (requester, decider, reason, etc.).
    pub details: serde_json::Value,
}

impl AuditEvent {
    fn new(event_type: &str, snapshot: &RequestSnapshot, details: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: snapshot.id.clone(),
            service: snapshot.service.clone(),
            scope: snapshot.scope.clone(),
            details,
        }
    }

    pub fn submitted(snapshot: &RequestSnapshot) -> Self {
        Self::new(
            "request_submitted",
            snapshot,
            serde_json::json!({
                "requester": snapshot.requester_ref,
                "reason": snapshot.reason,
            }),
        )
    }

    pub fn approved(snapshot: &RequestSnapshot) -> Self {
        Self::new(
            "request_approved",
            snapshot,
            serde_json::json!({ "decided_by": snapshot.decided_by }),
        )
    }

    pub fn denied(snapshot: &RequestSnapshot) -> Self {
        Self::new(
            "request_denied",
            snapshot,
            serde_json::json!({ "decided_by": snapshot.decided_by }),
        )
    }

    pub fn timed_out(snapshot: &RequestSnapshot) -> Self {
        Self::new("request_timed_out", snapshot, serde_json::json!({}))
    }

    pub fn consumed(snapshot: &RequestSnapshot) -> Self {
        Self::new(
            "credential_picked_up",
            snapshot,
            serde_json::json!({ "requester": snapshot.requester_ref }),
        )
    }

    pub fn replay_blocked(snapshot: &RequestSnapshot) -> Self {
        Self::new("pickup_replay_blocked", snapshot, serde_json::json!({}))
    }
}

// ── Channel Seam ──────────────────────────────────────────────

/// Out-of-band channel that shows approval prompts to a human and carries
/// audit lines. Decisions come back asynchronously through the decision
/// endpoint; this trait is outbound only.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Post the approval prompt for a freshly created request.
    async fn post_prompt(&self, request: &RequestSnapshot) -> anyhow::Result<()>;

    /// Post an audit event.
    async fn post_audit(&self, event: &AuditEvent) -> anyhow::Result<()>;

    async fn is_reachable(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RequestStore;

    fn snapshot() -> RequestSnapshot {
        RequestStore::new(std::time::Duration::from_secs(600))
            .create("github-api", "repo", "debugging", "abcd1234")
    }

    #[test]
    fn test_submitted_event_fields() {
        let event = AuditEvent::submitted(&snapshot());
        assert_eq!(event.event_type, "request_submitted");
        assert_eq!(event.service, "github-api");
        assert_eq!(event.details["requester"], "abcd1234");
        assert_eq!(event.details["reason"], "debugging");
        assert!(chrono::DateTime::parse_from_rfc3339(&event.timestamp).is_ok());
    }

    #[test]
    fn test_denial_and_timeout_are_distinct_internally() {
        let snap = snapshot();
        assert_ne!(
            AuditEvent::denied(&snap).event_type,
            AuditEvent::timed_out(&snap).event_type
        );
    }
}
