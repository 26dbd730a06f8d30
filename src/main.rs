use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatekeeper::broker::RequestBroker;
use gatekeeper::middleware::rate_limit::RateLimiter;
use gatekeeper::notification::webhook::WebhookChannel;
use gatekeeper::notification::NotificationChannel;
use gatekeeper::store::RequestStore;
use gatekeeper::vault::bitwarden::BitwardenCatalog;
use gatekeeper::vault::memory::MemoryCatalog;
use gatekeeper::vault::ServiceCatalog;
use gatekeeper::{api, cli, config, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "gatekeeper=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let port = match args.command {
        Some(cli::Commands::Serve { port }) => port.unwrap_or(cfg.port),
        None => cfg.port,
    };

    run_server(cfg, port).await
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let catalog: Arc<dyn ServiceCatalog> = match &cfg.vault_master_password {
        Some(password) => {
            tracing::info!("initializing vault catalog...");
            let catalog = BitwardenCatalog::new(&cfg.vaultwarden_url, password);
            if let Err(e) = catalog.configure_server().await {
                tracing::error!("vault server configuration failed: {}", e);
            }
            Arc::new(catalog)
        }
        None => {
            tracing::warn!("VAULTWARDEN_MASTER_PASSWORD not set — using in-memory catalog");
            match &cfg.catalog_file {
                Some(path) => Arc::new(MemoryCatalog::from_file(path)?),
                None => Arc::new(MemoryCatalog::new()),
            }
        }
    };

    let notifier: Arc<dyn NotificationChannel> = Arc::new(WebhookChannel::new(
        cfg.approval_webhook_url.clone(),
        cfg.audit_webhook_url.clone(),
    ));

    let store = Arc::new(RequestStore::new(cfg.approval_timeout));
    let limiter = Arc::new(RateLimiter::new(cfg.rate_limit, cfg.rate_limit_window));
    let broker = RequestBroker::new(store.clone(), limiter.clone(), catalog, notifier.clone());

    let state = Arc::new(AppState { broker, config: cfg.clone() });

    jobs::sweeper::spawn_timeout_sweeper(store.clone(), notifier, cfg.sweep_interval);
    jobs::sweeper::spawn_retention_purge(store, cfg.sweep_interval.max(cfg.retention / 4), cfg.retention);
    jobs::sweeper::spawn_limiter_purge(limiter, cfg.rate_limit_window);
    tracing::info!("background sweeper and retention purge started");

    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("gatekeeper listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
