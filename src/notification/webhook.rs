//! Webhook-backed notification channel.
//!
//! Approval prompts go to one webhook, audit events to another (they map
//! to separate chat channels). Delivery is best-effort: a lost prompt
//! only means the request resolves by timeout.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::models::request::RequestSnapshot;
use crate::notification::{AuditEvent, NotificationChannel};

#[derive(Serialize)]
struct WebhookMessage {
    text: String,
}

#[derive(Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    approval_url: Option<String>,
    audit_url: Option<String>,
}

impl WebhookChannel {
    pub fn new(approval_url: Option<String>, audit_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("Gatekeeper-Webhook/1.0")
                .build()
                .expect("failed to build webhook HTTP client"),
            approval_url,
            audit_url,
        }
    }

    async fn post_json<T: Serialize>(&self, url: &str, body: &T) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("failed to send webhook")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned error: status={}, body={}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn post_prompt(&self, request: &RequestSnapshot) -> anyhow::Result<()> {
        let url = match &self.approval_url {
            Some(u) => u,
            None => {
                tracing::debug!("no approval webhook URL configured, skipping prompt");
                return Ok(());
            }
        };

        let message = WebhookMessage {
            text: format!(
                "🔐 *Credential Access Request*\n\nRequest ID: `{}`\nService: `{}`\nScope: `{}`\nRequester: `{}`\nExpires: {}\nReason: {}\n\n\
                 Approve: `POST /decision {{\"request_id\": \"{}\", \"approved\": true}}`\n\
                 Deny:    `POST /decision {{\"request_id\": \"{}\", \"approved\": false}}`",
                request.id,
                request.service,
                request.scope,
                request.requester_ref,
                request.deadline.to_rfc3339(),
                request.reason,
                request.id,
                request.id,
            ),
        };

        self.post_json(url, &message).await?;
        tracing::info!(request_id = %request.id, "posted approval prompt");
        Ok(())
    }

    async fn post_audit(&self, event: &AuditEvent) -> anyhow::Result<()> {
        let url = match &self.audit_url {
            Some(u) => u,
            None => {
                tracing::debug!("no audit webhook URL configured, skipping audit post");
                return Ok(());
            }
        };
        self.post_json(url, event).await
    }

    /// Probe the approval endpoint. Any HTTP answer counts as reachable
    /// (webhook hosts often reject non-POST methods); only a transport
    /// failure or timeout means the endpoint is down.
    async fn is_reachable(&self) -> bool {
        let url = match &self.approval_url {
            Some(u) => u,
            None => return false,
        };
        match self
            .client
            .head(url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "approval webhook unreachable");
                false
            }
        }
    }
}

/// Fire-and-forget audit dispatch. Failures are logged, never propagated.
pub fn dispatch_audit(channel: &std::sync::Arc<dyn NotificationChannel>, event: AuditEvent) {
    let channel = channel.clone();
    tokio::spawn(async move {
        if let Err(e) = channel.post_audit(&event).await {
            warn!(event_type = %event.event_type, error = %e, "audit post failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RequestStore;

    fn snapshot() -> RequestSnapshot {
        RequestStore::new(std::time::Duration::from_secs(600))
            .create("github-api", "repo", "debug", "abcd1234")
    }

    #[tokio::test]
    async fn test_unconfigured_prompt_is_noop() {
        let channel = WebhookChannel::new(None, None);
        assert!(channel.post_prompt(&snapshot()).await.is_ok());
        assert!(!channel.is_reachable().await);
    }

    #[tokio::test]
    async fn test_prompt_posts_to_webhook() {
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let snap = snapshot();

        Mock::given(method("POST"))
            .and(path("/approvals"))
            .and(body_string_contains(&snap.id))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(Some(format!("{}/approvals", server.uri())), None);
        channel.post_prompt(&snap).await.unwrap();
    }

    #[tokio::test]
    async fn test_prompt_surfaces_server_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(Some(server.uri()), None);
        assert!(channel.post_prompt(&snapshot()).await.is_err());
    }

    #[tokio::test]
    async fn test_reachability_tracks_endpoint_not_config() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let up = WebhookChannel::new(Some(server.uri()), None);
        assert!(up.is_reachable().await);

        // Configured but nothing listening: must report unreachable.
        let down = WebhookChannel::new(Some("http://127.0.0.1:9".to_string()), None);
        assert!(!down.is_reachable().await);
    }

    #[tokio::test]
    async fn test_reachability_accepts_method_not_allowed() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;

        // The host answered; a method rejection is still "up".
        let channel = WebhookChannel::new(Some(server.uri()), None);
        assert!(channel.is_reachable().await);
    }

    #[tokio::test]
    async fn test_audit_event_delivery() {
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audit"))
            .and(body_string_contains("request_submitted"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(None, Some(format!("{}/audit", server.uri())));
        let snap = snapshot();
        channel.post_audit(&AuditEvent::submitted(&snap)).await.unwrap();
    }
}
