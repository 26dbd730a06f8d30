//! In-memory catalog backend for development and tests.
//!
//! Seeded programmatically or from a JSON file:
//!
//! ```json
//! {
//!   "github-api": {
//!     "scopes": ["repo", "read-only"],
//!     "auto_approve": false,
//!     "credential": {"username": "bot", "password": "hunter2"}
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use crate::models::request::Credential;
use crate::vault::{ScopeDecision, ServiceCatalog};

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub scopes: Vec<String>,
    #[serde(default)]
    pub auto_approve: bool,
    #[serde(default)]
    pub credential: Credential,
}

#[derive(Default)]
pub struct MemoryCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog file {path}"))?;
        let entries: BTreeMap<String, CatalogEntry> =
            serde_json::from_str(&raw).context("invalid catalog file")?;
        tracing::info!(path, services = entries.len(), "loaded in-memory catalog");
        Ok(Self { entries })
    }

    pub fn with_entry(mut self, service: &str, entry: CatalogEntry) -> Self {
        self.entries.insert(service.to_string(), entry);
        self
    }

    fn lookup(&self, service: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(service))
            .map(|(_, entry)| entry)
    }
}

#[async_trait]
impl ServiceCatalog for MemoryCatalog {
    async fn resolve_scope(&self, service: &str, scope: &str) -> anyhow::Result<ScopeDecision> {
        let decision = match self.lookup(service) {
            Some(entry) => {
                let allowed = entry.scopes.iter().any(|s| s.eq_ignore_ascii_case(scope));
                ScopeDecision { allowed, auto_approve: allowed && entry.auto_approve }
            }
            None => ScopeDecision { allowed: false, auto_approve: false },
        };
        Ok(decision)
    }

    async fn fetch_credential(
        &self,
        service: &str,
        scope: &str,
    ) -> anyhow::Result<Option<Credential>> {
        Ok(self.lookup(service).map(|entry| {
            let mut credential = entry.credential.clone();
            credential.insert("service".into(), service.into());
            credential.insert("scope".into(), scope.into());
            credential
        }))
    }

    async fn list_services(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }

    async fn is_reachable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new().with_entry(
            "github-api",
            CatalogEntry {
                scopes: vec!["repo".into()],
                auto_approve: false,
                credential: Credential::from([("token".to_string(), "ghp_x".into())]),
            },
        )
    }

    #[tokio::test]
    async fn test_resolve_known_scope() {
        let decision = catalog().resolve_scope("github-api", "repo").await.unwrap();
        assert!(decision.allowed);
        assert!(!decision.auto_approve);
    }

    #[tokio::test]
    async fn test_resolve_unknown_scope_or_service() {
        let c = catalog();
        assert!(!c.resolve_scope("github-api", "admin").await.unwrap().allowed);
        assert!(!c.resolve_scope("aws-prod", "read-only").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_fetch_stamps_service_and_scope() {
        let cred = catalog()
            .fetch_credential("github-api", "repo")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred["service"], "github-api");
        assert_eq!(cred["scope"], "repo");
        assert_eq!(cred["token"], "ghp_x");
    }

    #[tokio::test]
    async fn test_auto_approve_requires_allowed_scope() {
        let c = MemoryCatalog::new().with_entry(
            "auto-svc",
            CatalogEntry {
                scopes: vec!["read".into()],
                auto_approve: true,
                credential: Credential::new(),
            },
        );
        assert!(c.resolve_scope("auto-svc", "read").await.unwrap().auto_approve);
        assert!(!c.resolve_scope("auto-svc", "write").await.unwrap().auto_approve);
    }
}
