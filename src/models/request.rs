use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credential payload returned by the vault on a successful pickup.
/// Field set varies per vault item (username, password, notes, custom fields).
pub type Credential = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
    TimedOut,
    Consumed,
}

impl RequestStatus {
    /// True for the three statuses a pending record can be decided into.
    pub fn is_decision(self) -> bool {
        matches!(
            self,
            RequestStatus::Approved | RequestStatus::Denied | RequestStatus::TimedOut
        )
    }
}

/// A single credential request record. Owned exclusively by the
/// [`RequestStore`](crate::store::RequestStore); everything outside the
/// store sees only [`RequestSnapshot`] copies.
#[derive(Debug, Clone)]
pub struct CredentialRequest {
    pub id: String,
    pub service: String,
    pub scope: String,
    pub reason: String,
    /// Opaque caller identity (hashed API key). Audit only.
    pub requester_ref: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    /// `created_at + approval_timeout`. Pending past this is swept to TimedOut.
    pub deadline: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
}

impl CredentialRequest {
    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            id: self.id.clone(),
            service: self.service.clone(),
            scope: self.scope.clone(),
            reason: self.reason.clone(),
            requester_ref: self.requester_ref.clone(),
            status: self.status,
            created_at: self.created_at,
            deadline: self.deadline,
            decided_at: self.decided_at,
            decided_by: self.decided_by.clone(),
        }
    }
}

/// Immutable view of a request record, handed to the broker, the
/// notification channel, and the audit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSnapshot {
    pub id: String,
    pub service: String,
    pub scope: String,
    pub reason: String,
    pub requester_ref: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_statuses() {
        assert!(RequestStatus::Approved.is_decision());
        assert!(RequestStatus::Denied.is_decision());
        assert!(RequestStatus::TimedOut.is_decision());
        assert!(!RequestStatus::Pending.is_decision());
        assert!(!RequestStatus::Consumed.is_decision());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&RequestStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
