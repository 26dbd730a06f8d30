//! Bitwarden / Vaultwarden CLI catalog backend.
//!
//! Shells out to `bw`, holding the unlock session key behind a mutex.
//! A vault item is a service; its `scopes` custom field (comma-separated)
//! is the allow-list, and an `auto_approve` field set to `true` skips the
//! human approval step for that item.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::models::request::Credential;
use crate::vault::{ScopeDecision, ServiceCatalog};

const SCOPES_FIELD: &str = "scopes";
const AUTO_APPROVE_FIELD: &str = "auto_approve";

#[derive(Debug, Deserialize)]
struct BwItem {
    name: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    login: Option<BwLogin>,
    #[serde(default)]
    fields: Vec<BwField>,
}

#[derive(Debug, Deserialize)]
struct BwLogin {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    uris: Vec<BwUri>,
}

#[derive(Debug, Deserialize)]
struct BwUri {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BwField {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

impl BwItem {
    fn allowed_scopes(&self) -> Option<Vec<String>> {
        self.fields
            .iter()
            .find(|f| f.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(SCOPES_FIELD)))
            .map(|f| {
                f.value
                    .as_deref()
                    .unwrap_or_default()
                    .split(',')
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
    }

    fn auto_approve(&self) -> bool {
        self.fields
            .iter()
            .find(|f| {
                f.name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(AUTO_APPROVE_FIELD))
            })
            .and_then(|f| f.value.as_deref())
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

pub struct BitwardenCatalog {
    server_url: String,
    master_password: String,
    session: Mutex<Option<String>>,
}

impl BitwardenCatalog {
    pub fn new(server_url: &str, master_password: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            master_password: master_password.to_string(),
            session: Mutex::new(None),
        }
    }

    async fn run(args: &[&str]) -> anyhow::Result<String> {
        let output = Command::new("bw")
            .args(args)
            .output()
            .await
            .context("failed to execute bw")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("bw {} failed: {}", args.first().unwrap_or(&""), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Point the CLI at the configured server. Call once at startup.
    pub async fn configure_server(&self) -> anyhow::Result<()> {
        Self::run(&["config", "server", &self.server_url]).await?;
        tracing::info!(url = %self.server_url, "configured vault server");
        Ok(())
    }

    /// Unlock the vault if needed and return the session key.
    async fn unlock(&self) -> anyhow::Result<String> {
        let mut session = self.session.lock().await;
        if let Some(key) = session.as_ref() {
            // Probe the existing session; re-unlock on failure.
            if Self::run(&["list", "items", "--session", key]).await.is_ok() {
                return Ok(key.clone());
            }
            tracing::warn!("vault session expired, unlocking again");
        }
        let key = Self::run(&["unlock", "--raw", "--nointeraction", &self.master_password])
            .await
            .context("vault unlock failed")?;
        tracing::info!("vault unlocked");
        *session = Some(key.clone());
        Ok(key)
    }

    async fn find_item(&self, service: &str) -> anyhow::Result<Option<BwItem>> {
        let session = self.unlock().await?;
        let raw = Self::run(&["list", "items", "--search", service, "--session", &session]).await?;
        let items: Vec<BwItem> =
            serde_json::from_str(&raw).context("unexpected bw list items output")?;
        Ok(items.into_iter().find(|i| i.name.eq_ignore_ascii_case(service)))
    }
}

#[async_trait]
impl ServiceCatalog for BitwardenCatalog {
    async fn resolve_scope(&self, service: &str, scope: &str) -> anyhow::Result<ScopeDecision> {
        let Some(item) = self.find_item(service).await? else {
            tracing::debug!(service, "no vault item for service");
            return Ok(ScopeDecision { allowed: false, auto_approve: false });
        };
        let Some(scopes) = item.allowed_scopes() else {
            tracing::debug!(service, "vault item has no scopes field");
            return Ok(ScopeDecision { allowed: false, auto_approve: false });
        };
        let allowed = scopes.contains(&scope.to_ascii_lowercase());
        if !allowed {
            tracing::debug!(service, scope, "scope not in allow-list");
        }
        Ok(ScopeDecision { allowed, auto_approve: allowed && item.auto_approve() })
    }

    async fn fetch_credential(
        &self,
        service: &str,
        scope: &str,
    ) -> anyhow::Result<Option<Credential>> {
        let Some(item) = self.find_item(service).await? else {
            return Ok(None);
        };

        let mut credential = Credential::new();
        credential.insert("service".into(), service.into());
        credential.insert("scope".into(), scope.into());
        credential.insert("name".into(), item.name.clone().into());
        if let Some(login) = &item.login {
            if let Some(username) = &login.username {
                credential.insert("username".into(), username.clone().into());
            }
            if let Some(password) = &login.password {
                credential.insert("password".into(), password.clone().into());
            }
            let uris: Vec<serde_json::Value> = login
                .uris
                .iter()
                .filter_map(|u| u.uri.clone().map(Into::into))
                .collect();
            if !uris.is_empty() {
                credential.insert("uris".into(), uris.into());
            }
        }
        if let Some(notes) = &item.notes {
            credential.insert("notes".into(), notes.clone().into());
        }
        // Custom fields ride along, minus the catalog-internal ones.
        for field in &item.fields {
            if let (Some(name), Some(value)) = (&field.name, &field.value) {
                if name.eq_ignore_ascii_case(SCOPES_FIELD)
                    || name.eq_ignore_ascii_case(AUTO_APPROVE_FIELD)
                {
                    continue;
                }
                credential.insert(name.clone(), value.clone().into());
            }
        }
        Ok(Some(credential))
    }

    async fn list_services(&self) -> anyhow::Result<Vec<String>> {
        let session = self.unlock().await?;
        let raw = Self::run(&["list", "items", "--session", &session]).await?;
        let items: Vec<BwItem> =
            serde_json::from_str(&raw).context("unexpected bw list items output")?;
        let mut services: Vec<String> = items
            .into_iter()
            .filter(|i| i.allowed_scopes().is_some())
            .map(|i| i.name)
            .collect();
        services.sort();
        Ok(services)
    }

    async fn is_reachable(&self) -> bool {
        self.list_services().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_from(json: serde_json::Value) -> BwItem {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_allowed_scopes_parsing() {
        let item = item_from(serde_json::json!({
            "name": "github-api",
            "fields": [{"name": "Scopes", "value": "repo, Read-Only ,"}]
        }));
        assert_eq!(item.allowed_scopes().unwrap(), vec!["repo", "read-only"]);
    }

    #[test]
    fn test_missing_scopes_field() {
        let item = item_from(serde_json::json!({"name": "plain-login"}));
        assert!(item.allowed_scopes().is_none());
    }

    #[test]
    fn test_auto_approve_flag() {
        let yes = item_from(serde_json::json!({
            "name": "svc",
            "fields": [{"name": "auto_approve", "value": "TRUE"}]
        }));
        assert!(yes.auto_approve());

        let no = item_from(serde_json::json!({
            "name": "svc",
            "fields": [{"name": "auto_approve", "value": "yes"}]
        }));
        assert!(!no.auto_approve());
    }

    #[test]
    fn test_item_tolerates_sparse_json() {
        // bw omits login/fields on some item types
        let item = item_from(serde_json::json!({"name": "note-only", "notes": "hi"}));
        assert!(item.login.is_none());
        assert!(item.fields.is_empty());
    }
}
