use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bucket_access::access::{AccessResolver, AttachmentPolicy};
use bucket_access::config;
use bucket_access::database::{DatabaseManager, PgStore};
use bucket_access::handlers::{self, AppState, ListingLimits};
use bucket_access::is_production;
use bucket_access::middleware::AuthKeys;

#[derive(Parser)]
#[command(name = "bucket-access")]
#[command(about = "Bucket/course/file access checks over HTTP")]
#[command(version)]
struct Cli {
    #[arg(long, help = "Port to listen on (overrides API_PORT)")]
    port: Option<u16>,

    #[arg(long, help = "Address to bind (overrides API_BIND_ADDRESS)")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SECURITY_JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = config::config();
    tracing::info!("Starting Bucket Access API in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("SECURITY_JWT_SECRET must be set");
    }
    if is_production!() && config.access.attachment_url_prefix.is_none() {
        tracing::warn!("ACCESS_ATTACHMENT_URL_PREFIX is unset; requests with attachments will be denied");
    }

    let pool = DatabaseManager::pool(&config.database)
        .await
        .context("failed to connect to database")?;
    DatabaseManager::migrate(&pool)
        .await
        .context("failed to apply database migrations")?;
    let store = Arc::new(PgStore::new(pool));

    let resolver = AccessResolver::new(
        store.clone(),
        store.clone(),
        AttachmentPolicy::new(config.access.attachment_url_prefix.clone()),
    );

    let state = AppState {
        resolver: Arc::new(resolver),
        catalog: store,
        auth: AuthKeys::from_secret(&config.security.jwt_secret),
        limits: ListingLimits {
            max_course_ids: config.access.max_course_ids,
            max_items_per_page: config.access.max_items_per_page,
        },
    };

    let app = handlers::app(state).layer(handlers::cors_layer(&config.security));

    let bind = cli.bind.unwrap_or_else(|| config.api.bind_address.clone());
    let port = cli.port.unwrap_or(config.api.port);
    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Bucket Access API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    DatabaseManager::close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
