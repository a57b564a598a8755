//! # Adgate Main Entry Point

use std::sync::Arc;

use adgate::{
    config::ConfigLoader,
    crypto::CryptoKey,
    db,
    notify::{LogNotifier, Notifier, WebhookNotifier},
    platform::HttpAdsPlatform,
    server::{AppState, run_server},
    telemetry,
};
use anyhow::Context;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let crypto_key = CryptoKey::new(
        config
            .crypto_key
            .clone()
            .context("crypto key not present in configuration")?,
    )?;

    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;

    let platform = HttpAdsPlatform::from_config(&config)?;
    let notifier: Arc<dyn Notifier> = match WebhookNotifier::from_config(&config.notification)? {
        Some(webhook) => {
            tracing::info!("Governance events delivered by webhook");
            Arc::new(webhook)
        }
        None => Arc::new(LogNotifier),
    };

    let config = Arc::new(config);
    let state = AppState::new(
        config.clone(),
        Arc::new(db),
        crypto_key,
        Arc::new(platform),
        notifier,
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        signal_token.cancel();
    });

    run_server(config, state, shutdown).await
}
