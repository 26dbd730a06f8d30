use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub api_key: String,
    pub decision_key: Option<String>,
    pub approval_webhook_url: Option<String>,
    pub audit_webhook_url: Option<String>,
    pub vaultwarden_url: String,
    pub vault_master_password: Option<String>,
    /// JSON seed for the in-memory catalog (dev fallback when no vault
    /// password is configured).
    pub catalog_file: Option<String>,
    pub approval_timeout: Duration,
    /// Submissions per window per client. 0 = disabled.
    pub rate_limit: u64,
    pub rate_limit_window: Duration,
    pub sweep_interval: Duration,
    /// How long decided records stay pollable before the purge drops them.
    pub retention: Duration,
}

const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_GATEKEEPER_KEY";

impl Config {
    /// Key guarding `POST /decision`. Falls back to the API key when
    /// GATEKEEPER_DECISION_KEY is not set.
    pub fn decision_key(&self) -> &str {
        self.decision_key.as_deref().unwrap_or(&self.api_key)
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let api_key =
        std::env::var("GATEKEEPER_API_KEY").unwrap_or_else(|_| PLACEHOLDER_API_KEY.into());

    if api_key == PLACEHOLDER_API_KEY {
        let env_mode = std::env::var("GATEKEEPER_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "GATEKEEPER_API_KEY is still the insecure placeholder. \
                 Set a proper key before running in production."
            );
        }
        eprintln!("⚠️  GATEKEEPER_API_KEY is not set — using insecure placeholder. Set a real key for production.");
    }

    Ok(Config {
        port: std::env::var("GATEKEEPER_PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .unwrap_or(8000),
        api_key,
        decision_key: std::env::var("GATEKEEPER_DECISION_KEY").ok(),
        approval_webhook_url: std::env::var("GATEKEEPER_APPROVAL_WEBHOOK_URL").ok(),
        audit_webhook_url: std::env::var("GATEKEEPER_AUDIT_WEBHOOK_URL").ok(),
        vaultwarden_url: std::env::var("VAULTWARDEN_URL")
            .unwrap_or_else(|_| "https://vault.example.com".into()),
        vault_master_password: std::env::var("VAULTWARDEN_MASTER_PASSWORD").ok(),
        catalog_file: std::env::var("GATEKEEPER_CATALOG_FILE").ok(),
        approval_timeout: Duration::from_secs(env_u64("GATEKEEPER_APPROVAL_TIMEOUT_SECS", 600)),
        rate_limit: env_u64("GATEKEEPER_RATE_LIMIT", 10),
        rate_limit_window: Duration::from_secs(env_u64("GATEKEEPER_RATE_LIMIT_WINDOW_SECS", 60)),
        sweep_interval: Duration::from_secs(env_u64("GATEKEEPER_SWEEP_INTERVAL_SECS", 5)),
        retention: Duration::from_secs(env_u64("GATEKEEPER_RETENTION_SECS", 900)),
    })
}

fn env_u64(var: &str, default: u64) -> u64 {
    std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_key_falls_back_to_api_key() {
        let mut config = Config {
            port: 8000,
            api_key: "api".into(),
            decision_key: None,
            approval_webhook_url: None,
            audit_webhook_url: None,
            vaultwarden_url: "https://vault.example.com".into(),
            vault_master_password: None,
            catalog_file: None,
            approval_timeout: Duration::from_secs(600),
            rate_limit: 10,
            rate_limit_window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
            retention: Duration::from_secs(900),
        };
        assert_eq!(config.decision_key(), "api");
        config.decision_key = Some("decide".into());
        assert_eq!(config.decision_key(), "decide");
    }
}
