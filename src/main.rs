// src/main.rs

//! # Authentication Provider - Main Entry Point
//!
//! Loads configuration, builds the shared service context and serves the
//! HTTP API until interrupted.
//!
//! ## Environment Variables
//! - `AUTH_SIGNER__PRIVATE_KEY_HEX`: service signing key (required)
//! - `AUTH_PRODUCTION`: set to `true` in production
//! - `AUTH_ATTESTATION__CERTIFICATE_PEM`: identity broker public key
//! - `AUTH_LEDGER__RPC_URL`, `AUTH_LEDGER__PRIVATE_KEY_HEX`,
//!   `AUTH_LEDGER__AUTH_PROVIDER_ADDRESS`: ledger access
//! - `RUST_LOG`: log filter (default `info`)
//!
//! See [`auth_provider::config`] for the full list.

use anyhow::Context;
use auth_provider::config::Settings;
use auth_provider::context::ServiceContext;
use auth_provider::services::api_server::ApiServer;
use log::{info, warn};
use std::sync::Arc;

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment configuration
/// 2. Build signer, validator and ledger connection
/// 3. Start API server
/// 4. Drain requests and close the context on ctrl-c
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if !settings.production {
        warn!("Running outside production: skip flags are honoured");
    }

    let context = Arc::new(
        ServiceContext::initialize(&settings)
            .await
            .context("failed to initialize service context")?,
    );

    let addr = settings.bind_address()?;
    info!("Available endpoints:");
    info!("- POST /auth/verify");
    info!("- POST /auth/verify/bankid");
    info!("- GET  /health");

    ApiServer::new(context.clone())
        .run(addr, shutdown_signal())
        .await
        .context("API server failed")?;

    match Arc::try_unwrap(context) {
        Ok(context) => context.close(),
        Err(_) => warn!("Service context still referenced at shutdown"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
