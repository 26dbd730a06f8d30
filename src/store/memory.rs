//! In-memory request table.
//!
//! Every status change goes through [`RequestStore::transition`] or
//! [`RequestStore::consume`]; both do their read-modify-write under the
//! DashMap entry's write guard, so a decision callback, the timeout
//! sweeper, and concurrent pickups racing on one record always produce
//! exactly one winner.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::models::request::{CredentialRequest, RequestSnapshot, RequestStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("request not found")]
    NotFound,
    #[error("request already decided")]
    AlreadyDecided,
    #[error("{0:?} is not a decision status")]
    NotADecision(RequestStatus),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsumeError {
    #[error("request not found")]
    NotFound,
    #[error("request is not approved")]
    NotApproved,
    #[error("credential already consumed")]
    AlreadyConsumed,
}

pub struct RequestStore {
    table: DashMap<String, CredentialRequest>,
    approval_timeout: Duration,
}

impl RequestStore {
    pub fn new(approval_timeout: std::time::Duration) -> Self {
        Self {
            table: DashMap::new(),
            approval_timeout: Duration::from_std(approval_timeout)
                .unwrap_or_else(|_| Duration::seconds(600)),
        }
    }

    /// Insert a fresh Pending record and return its id. No external I/O.
    pub fn create(
        &self,
        service: &str,
        scope: &str,
        reason: &str,
        requester_ref: &str,
    ) -> RequestSnapshot {
        let now = Utc::now();
        let record = CredentialRequest {
            id: format!("req_{}", Uuid::new_v4().simple()),
            service: service.to_string(),
            scope: scope.to_string(),
            reason: reason.to_string(),
            requester_ref: requester_ref.to_string(),
            status: RequestStatus::Pending,
            created_at: now,
            deadline: now + self.approval_timeout,
            decided_at: None,
            decided_by: None,
        };
        let snapshot = record.snapshot();
        self.table.insert(record.id.clone(), record);
        snapshot
    }

    /// The single authorized path out of Pending. First caller to observe
    /// Pending wins; everyone else gets `AlreadyDecided`.
    pub fn transition(
        &self,
        id: &str,
        new_status: RequestStatus,
        decided_by: &str,
    ) -> Result<RequestSnapshot, TransitionError> {
        if !new_status.is_decision() {
            return Err(TransitionError::NotADecision(new_status));
        }
        let mut entry = self.table.get_mut(id).ok_or(TransitionError::NotFound)?;
        if entry.status != RequestStatus::Pending {
            return Err(TransitionError::AlreadyDecided);
        }
        entry.status = new_status;
        entry.decided_at = Some(Utc::now());
        entry.decided_by = Some(decided_by.to_string());
        Ok(entry.snapshot())
    }

    pub fn read(&self, id: &str) -> Option<RequestSnapshot> {
        self.table.get(id).map(|r| r.snapshot())
    }

    /// Approved → Consumed, at most once. Two racing pickups get exactly
    /// one `Ok` and one `AlreadyConsumed`.
    pub fn consume(&self, id: &str) -> Result<RequestSnapshot, ConsumeError> {
        let mut entry = self.table.get_mut(id).ok_or(ConsumeError::NotFound)?;
        match entry.status {
            RequestStatus::Approved => {
                entry.status = RequestStatus::Consumed;
                Ok(entry.snapshot())
            }
            RequestStatus::Consumed => Err(ConsumeError::AlreadyConsumed),
            _ => Err(ConsumeError::NotApproved),
        }
    }

    /// Ids of Pending records whose deadline has elapsed. The sweeper
    /// transitions each one separately so a concurrent human decision can
    /// still win the race per record.
    pub fn expired_pending(&self, now: DateTime<Utc>) -> Vec<String> {
        self.table
            .iter()
            .filter(|r| r.status == RequestStatus::Pending && r.deadline <= now)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Drop decided records older than the retention cutoff. Pending
    /// records are never removed here; they time out first.
    pub fn purge_decided_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.table.len();
        self.table
            .retain(|_, r| match r.decided_at {
                Some(decided_at) => decided_at > cutoff,
                None => true,
            });
        before - self.table.len()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn store() -> RequestStore {
        RequestStore::new(StdDuration::from_secs(600))
    }

    #[test]
    fn test_create_inserts_pending() {
        let store = store();
        let snap = store.create("github-api", "repo", "debug", "abcd1234");
        assert_eq!(snap.status, RequestStatus::Pending);
        assert!(snap.id.starts_with("req_"));
        assert!(snap.decided_at.is_none());
        assert_eq!(store.read(&snap.id).unwrap().service, "github-api");
    }

    #[test]
    fn test_transition_is_exactly_once() {
        let store = store();
        let snap = store.create("svc", "ro", "r", "x");
        let first = store.transition(&snap.id, RequestStatus::Approved, "alice");
        assert!(first.is_ok());
        let second = store.transition(&snap.id, RequestStatus::Denied, "bob");
        assert_eq!(second.unwrap_err(), TransitionError::AlreadyDecided);
        // First decision is stable.
        assert_eq!(store.read(&snap.id).unwrap().status, RequestStatus::Approved);
        assert_eq!(store.read(&snap.id).unwrap().decided_by.as_deref(), Some("alice"));
    }

    #[test]
    fn test_transition_rejects_non_decisions() {
        let store = store();
        let snap = store.create("svc", "ro", "r", "x");
        assert!(matches!(
            store.transition(&snap.id, RequestStatus::Consumed, "x"),
            Err(TransitionError::NotADecision(_))
        ));
        assert!(matches!(
            store.transition(&snap.id, RequestStatus::Pending, "x"),
            Err(TransitionError::NotADecision(_))
        ));
    }

    #[test]
    fn test_transition_unknown_id() {
        assert_eq!(
            store().transition("req_missing", RequestStatus::Denied, "x"),
            Err(TransitionError::NotFound)
        );
    }

    #[test]
    fn test_consume_only_from_approved() {
        let store = store();
        let snap = store.create("svc", "ro", "r", "x");
        assert_eq!(store.consume(&snap.id), Err(ConsumeError::NotApproved));
        store.transition(&snap.id, RequestStatus::Approved, "alice").unwrap();
        assert!(store.consume(&snap.id).is_ok());
        assert_eq!(store.consume(&snap.id), Err(ConsumeError::AlreadyConsumed));
    }

    #[test]
    fn test_denied_never_consumable() {
        let store = store();
        let snap = store.create("svc", "ro", "r", "x");
        store.transition(&snap.id, RequestStatus::Denied, "alice").unwrap();
        assert_eq!(store.consume(&snap.id), Err(ConsumeError::NotApproved));
    }

    #[test]
    fn test_expired_pending_respects_deadline() {
        let store = RequestStore::new(StdDuration::from_secs(0));
        let snap = store.create("svc", "ro", "r", "x");
        let expired = store.expired_pending(Utc::now() + Duration::seconds(1));
        assert_eq!(expired, vec![snap.id.clone()]);

        // Decided records are never reported as expired.
        store.transition(&snap.id, RequestStatus::TimedOut, "system").unwrap();
        assert!(store.expired_pending(Utc::now() + Duration::seconds(1)).is_empty());
    }

    #[test]
    fn test_purge_keeps_pending() {
        let store = store();
        let pending = store.create("svc", "ro", "r", "x");
        let decided = store.create("svc", "ro", "r", "x");
        store.transition(&decided.id, RequestStatus::Denied, "alice").unwrap();

        let removed = store.purge_decided_before(Utc::now() + Duration::seconds(1));
        assert_eq!(removed, 1);
        assert!(store.read(&pending.id).is_some());
        assert!(store.read(&decided.id).is_none());
    }
}
