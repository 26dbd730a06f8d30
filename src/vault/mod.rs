pub mod bitwarden;
pub mod memory;

use async_trait::async_trait;

use crate::models::request::Credential;

/// Outcome of resolving a `(service, scope)` pair against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeDecision {
    pub allowed: bool,
    /// Vault item opted into skipping the human approval step.
    pub auto_approve: bool,
}

/// Abstraction over the vault backend holding services and credentials.
/// Implementations: Bitwarden CLI (production), in-memory (dev/tests).
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// Is `scope` permitted for `service`? Consulted at submission time,
    /// before any record exists.
    async fn resolve_scope(&self, service: &str, scope: &str) -> anyhow::Result<ScopeDecision>;

    /// Fetch the credential payload. Called only after a pickup wins the
    /// store's consume race. `None` means the item vanished post-approval.
    async fn fetch_credential(
        &self,
        service: &str,
        scope: &str,
    ) -> anyhow::Result<Option<Credential>>;

    /// Names of services that expose at least one scope.
    async fn list_services(&self) -> anyhow::Result<Vec<String>>;

    async fn is_reachable(&self) -> bool;
}
