// src/services/api_server.rs
//! API Server for the authentication provider
//!
//! This module provides the REST API through which wallets authenticate with
//! a BankID attestation and receive their person credentials.
//!
//! The API is built using Axum and includes endpoints for:
//! - Authentication with an attestation and a binding signature
//! - Authentication with a holder presentation embedding the attestation
//! - Health and issuer information

use crate::context::ServiceContext;
use crate::services::auth_orchestrator::AuthFlags;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

// API request and response structures

/// Request payload for attestation based authentication
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAttestationRequest {
    /// BankID attestation token from the identity broker
    pub attestation_token: String,
    /// Personal-sign signature over keccak256(attestation_token)
    pub binding_signature: String,
    #[serde(default)]
    pub skip_external_check: bool,
    #[serde(default)]
    pub skip_ledger_record: bool,
}

/// Request payload for presentation based authentication
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPresentationRequest {
    /// Holder presentation addressed to this service
    pub jwt: String,
    #[serde(default)]
    pub skip_blockchain: bool,
    #[serde(default)]
    pub skip_bankid_verify: bool,
}

/// Body of every failed request
#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response for the health check
#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub issuer: String,
    pub production: bool,
}

/// API server state containing all service dependencies
#[derive(Clone)]
pub struct ApiServer {
    /// Signer, verifier and orchestrator shared by all requests
    context: Arc<ServiceContext>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `context` - Long-lived service state built at startup
    pub fn new(context: Arc<ServiceContext>) -> Self {
        ApiServer { context }
    }

    /// Configures all API routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/auth/verify", post(Self::verify_attestation_handler))
            .route("/auth/verify/bankid", post(Self::verify_presentation_handler))
            .route("/health", get(Self::health_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and serves requests until `shutdown` completes
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    /// * `shutdown` - Resolves when in-flight requests should be drained
    pub async fn run<F>(&self, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }

    // =====================
    // Authentication Handlers
    // =====================

    /// Authenticates with an attestation token and a binding signature
    ///
    /// # Endpoint
    /// POST /auth/verify
    ///
    /// # Responses
    /// - 200 OK: The two issued credential tokens, in order
    /// - 500 Internal Server Error: `{"error": message}`
    async fn verify_attestation_handler(
        State(state): State<Arc<Self>>,
        Json(payload): Json<VerifyAttestationRequest>,
    ) -> Response {
        let flags = AuthFlags {
            skip_external_check: payload.skip_external_check,
            skip_ledger_record: payload.skip_ledger_record,
        };
        let result = state
            .context
            .orchestrator()
            .authenticate(&payload.attestation_token, &payload.binding_signature, flags)
            .await;

        match result {
            Ok(credentials) => (StatusCode::OK, Json(credentials)).into_response(),
            Err(e) => failure(e),
        }
    }

    /// Authenticates with a presentation that embeds the attestation
    ///
    /// # Endpoint
    /// POST /auth/verify/bankid
    ///
    /// # Responses
    /// - 200 OK: The two issued credential tokens, in order
    /// - 500 Internal Server Error: `{"error": message}`
    async fn verify_presentation_handler(
        State(state): State<Arc<Self>>,
        Json(payload): Json<VerifyPresentationRequest>,
    ) -> Response {
        let flags = AuthFlags {
            skip_external_check: payload.skip_bankid_verify,
            skip_ledger_record: payload.skip_blockchain,
        };
        let result = state
            .context
            .orchestrator()
            .authenticate_presentation(&payload.jwt, flags)
            .await;

        match result {
            Ok(credentials) => (StatusCode::OK, Json(credentials)).into_response(),
            Err(e) => failure(e),
        }
    }

    /// GET /health
    async fn health_handler(State(state): State<Arc<Self>>) -> impl IntoResponse {
        Json(HealthResponse {
            status: "ok".into(),
            issuer: state.context.issuer_id().to_string(),
            production: state.context.is_production(),
        })
    }
}

fn failure(e: impl std::fmt::Display) -> Response {
    error!("Authentication failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: e.to_string() }),
    )
        .into_response()
}
