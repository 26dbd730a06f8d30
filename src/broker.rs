//! Request broker: the public-facing orchestrator over the store, the
//! rate limiter, the catalog, and the notification channel.

use std::sync::Arc;

use serde::Serialize;

use crate::errors::AppError;
use crate::middleware::rate_limit::RateLimiter;
use crate::models::request::{Credential, RequestSnapshot, RequestStatus};
use crate::notification::webhook::dispatch_audit;
use crate::notification::{AuditEvent, NotificationChannel};
use crate::store::{ConsumeError, RequestStore, TransitionError};
use crate::vault::ServiceCatalog;

/// Decider recorded when the sweeper times a request out.
pub const SYSTEM_DECIDER: &str = "system";
/// Decider recorded for catalog items with auto_approve set.
pub const AUTO_DECIDER: &str = "auto";

#[derive(Debug, PartialEq)]
pub enum PickupOutcome {
    Pending,
    /// Denial and timeout collapse to one variant so the wire response
    /// cannot distinguish "a human said no" from "nobody answered".
    Refused,
    Credential(Credential),
    /// Credential was already handed out once; replay blocked.
    NoLongerAvailable,
}

#[derive(Debug, Serialize)]
pub struct DecisionOutcome {
    pub request_id: String,
    pub status: RequestStatus,
    /// False when the callback lost the race (already decided) — a
    /// legitimate idempotent no-op, not an error.
    pub updated: bool,
}

#[derive(Debug, Serialize)]
pub struct BrokerStatus {
    pub services: Vec<String>,
    pub vault_connected: bool,
    pub notification_connected: bool,
}

pub struct RequestBroker {
    store: Arc<RequestStore>,
    limiter: Arc<RateLimiter>,
    catalog: Arc<dyn ServiceCatalog>,
    notifier: Arc<dyn NotificationChannel>,
}

impl RequestBroker {
    pub fn new(
        store: Arc<RequestStore>,
        limiter: Arc<RateLimiter>,
        catalog: Arc<dyn ServiceCatalog>,
        notifier: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self { store, limiter, catalog, notifier }
    }

    /// Accept a submission. Rate limit first (cheapest, no side effects),
    /// then catalog validation, then record creation and the prompt.
    /// Returns as soon as the record exists — never waits on the decision.
    pub async fn submit(
        &self,
        service: &str,
        scope: &str,
        reason: &str,
        requester_ref: &str,
        client_ref: &str,
    ) -> Result<RequestSnapshot, AppError> {
        if !self.limiter.allow(client_ref) {
            tracing::warn!(client = client_ref, "submission rate limited");
            return Err(AppError::RateLimited);
        }

        let decision = self.catalog.resolve_scope(service, scope).await?;
        if !decision.allowed {
            tracing::warn!(service, scope, "rejected submission for unknown service/scope");
            return Err(AppError::UnknownServiceOrScope);
        }

        let snapshot = self.store.create(service, scope, reason, requester_ref);
        tracing::info!(
            request_id = %snapshot.id,
            service,
            scope,
            requester = requester_ref,
            "credential request created"
        );
        dispatch_audit(&self.notifier, AuditEvent::submitted(&snapshot));

        if decision.auto_approve {
            // The item opted out of human approval; decide in place. The
            // submit response stays identical to the pending case.
            if let Ok(approved) =
                self.store.transition(&snapshot.id, RequestStatus::Approved, AUTO_DECIDER)
            {
                tracing::info!(request_id = %approved.id, "auto-approved");
                dispatch_audit(&self.notifier, AuditEvent::approved(&approved));
            }
            return Ok(snapshot);
        }

        // Fire-and-forget: a lost prompt is non-fatal, the request simply
        // resolves by timeout.
        let notifier = self.notifier.clone();
        let prompt_for = snapshot.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.post_prompt(&prompt_for).await {
                tracing::warn!(request_id = %prompt_for.id, error = %e, "approval prompt delivery failed");
            }
        });

        Ok(snapshot)
    }

    /// Serve a pickup poll. The first poll that observes Approved wins
    /// the consume race and gets the vault fetch; every later poll gets
    /// `NoLongerAvailable`.
    pub async fn pickup(&self, request_id: &str) -> Result<PickupOutcome, AppError> {
        let snapshot = self.store.read(request_id).ok_or(AppError::RequestNotFound)?;

        match snapshot.status {
            RequestStatus::Pending => Ok(PickupOutcome::Pending),
            RequestStatus::Denied | RequestStatus::TimedOut => Ok(PickupOutcome::Refused),
            RequestStatus::Consumed => {
                dispatch_audit(&self.notifier, AuditEvent::replay_blocked(&snapshot));
                Ok(PickupOutcome::NoLongerAvailable)
            }
            RequestStatus::Approved => match self.store.consume(request_id) {
                Ok(consumed) => self.fetch_for(&consumed).await,
                Err(ConsumeError::AlreadyConsumed) => {
                    dispatch_audit(&self.notifier, AuditEvent::replay_blocked(&snapshot));
                    Ok(PickupOutcome::NoLongerAvailable)
                }
                // Raced with nothing that can move Approved anywhere else,
                // but handle the store's answer rather than assume.
                Err(ConsumeError::NotApproved) => Ok(PickupOutcome::Refused),
                Err(ConsumeError::NotFound) => Err(AppError::RequestNotFound),
            },
        }
    }

    async fn fetch_for(&self, consumed: &RequestSnapshot) -> Result<PickupOutcome, AppError> {
        // The record stays Consumed whatever happens below: a vault-side
        // failure after approval is not retried automatically.
        match self.catalog.fetch_credential(&consumed.service, &consumed.scope).await {
            Ok(Some(credential)) => {
                tracing::info!(
                    request_id = %consumed.id,
                    service = %consumed.service,
                    scope = %consumed.scope,
                    "credential picked up"
                );
                dispatch_audit(&self.notifier, AuditEvent::consumed(consumed));
                Ok(PickupOutcome::Credential(credential))
            }
            Ok(None) => Err(AppError::VaultFetch(format!(
                "item for {}:{} no longer in vault",
                consumed.service, consumed.scope
            ))),
            Err(e) => Err(AppError::VaultFetch(e.to_string())),
        }
    }

    /// Apply an inbound human decision. Duplicate or late callbacks land
    /// on the store's atomic transition and come back as `updated: false`.
    pub fn handle_decision(
        &self,
        request_id: &str,
        approved: bool,
        decided_by: &str,
    ) -> Result<DecisionOutcome, AppError> {
        let new_status = if approved { RequestStatus::Approved } else { RequestStatus::Denied };

        match self.store.transition(request_id, new_status, decided_by) {
            Ok(snapshot) => {
                tracing::info!(
                    request_id,
                    approved,
                    decided_by,
                    "decision applied"
                );
                let event = if approved {
                    AuditEvent::approved(&snapshot)
                } else {
                    AuditEvent::denied(&snapshot)
                };
                dispatch_audit(&self.notifier, event);
                Ok(DecisionOutcome {
                    request_id: request_id.to_string(),
                    status: snapshot.status,
                    updated: true,
                })
            }
            Err(TransitionError::AlreadyDecided) => {
                let status = self
                    .store
                    .read(request_id)
                    .map(|s| s.status)
                    .ok_or(AppError::RequestNotFound)?;
                tracing::debug!(request_id, "late or duplicate decision ignored");
                Ok(DecisionOutcome { request_id: request_id.to_string(), status, updated: false })
            }
            Err(TransitionError::NotFound) => Err(AppError::RequestNotFound),
            Err(e @ TransitionError::NotADecision(_)) => Err(AppError::Internal(e.into())),
        }
    }

    /// Read-only aggregate for `/status`.
    pub async fn status(&self) -> BrokerStatus {
        let (services, vault_connected) = match self.catalog.list_services().await {
            Ok(services) => (services, true),
            Err(e) => {
                tracing::error!("failed to list vault services: {}", e);
                (Vec::new(), false)
            }
        };
        BrokerStatus {
            services,
            vault_connected,
            notification_connected: self.notifier.is_reachable().await,
        }
    }

    pub async fn vault_reachable(&self) -> bool {
        self.catalog.is_reachable().await
    }

    pub async fn notification_reachable(&self) -> bool {
        self.notifier.is_reachable().await
    }
}
