use std::sync::Arc;

use anyhow::Context;
use arems_webhook::channels::{MessagingPlatform, TelegramClient};
use arems_webhook::config::AppConfig;
use arems_webhook::error::ConfigError;
use arems_webhook::pipeline::Classifier;
use arems_webhook::store::{BlobStore, DocumentStore, FsBlobStore, LibSqlBackend};
use arems_webhook::webhook::{AppState, webhook_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("🚨 AREMS webhook v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening: http://{}", config.bind_addr);
    eprintln!("   Telegram API: {}", config.telegram_api_base);

    // ── Messaging platform ──────────────────────────────────────────────
    let telegram = TelegramClient::new(
        config.telegram_token.clone(),
        config.telegram_api_base.clone(),
        config.http_timeout,
    )?;
    if config.verify_token {
        telegram
            .health_check()
            .await
            .map_err(|e| ConfigError::TokenRejected(e.to_string()))
            .context("Telegram token check failed")?;
    } else {
        eprintln!("   Token check: skipped");
    }
    let platform: Arc<dyn MessagingPlatform> = Arc::new(telegram);

    // ── Document store ──────────────────────────────────────────────────
    let db_path = config.database_path();
    let store: Arc<dyn DocumentStore> = Arc::new(
        LibSqlBackend::new_local(&db_path)
            .await
            .with_context(|| format!("Failed to open document store at {}", db_path.display()))?,
    );
    eprintln!("   Database: {}", db_path.display());

    // ── Blob store ──────────────────────────────────────────────────────
    let bucket_root = config.bucket_root();
    tokio::fs::create_dir_all(&bucket_root)
        .await
        .with_context(|| format!("Failed to create bucket at {}", bucket_root.display()))?;
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&bucket_root));
    eprintln!("   Bucket: {}", bucket_root.display());

    let state = AppState {
        store,
        blobs,
        platform,
        classifier: Arc::new(Classifier::new(config.form_ua_marker.clone())),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Webhook server started");

    axum::serve(listener, webhook_routes(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
