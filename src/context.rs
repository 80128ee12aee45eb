// src/context.rs
//! Long-lived service state.
//!
//! The service signer and the ledger connection are created once at startup
//! and shared read-only by every request until [`ServiceContext::close`].

use crate::blockchain::ethereum_client::EthereumClient;
use crate::blockchain::in_memory::InMemoryLedger;
use crate::blockchain::ledger::LedgerGateway;
use crate::config::Settings;
use crate::error::StartupError;
use crate::services::auth_orchestrator::AuthOrchestrator;
use crate::services::credential_issuer::CredentialIssuer;
use crate::services::external_validator::{CertificateTokenValidator, ExternalTokenValidator, UnconfiguredValidator};
use crate::services::verifier::CredentialVerifier;
use crate::wallet::key_management::{signer_from_hex, Signer};
use crate::wallet::resolver::{DidResolver, UniversalResolver};
use log::{info, warn};
use std::sync::Arc;

pub struct ServiceContext {
    production: bool,
    signer: Arc<dyn Signer>,
    verifier: CredentialVerifier,
    orchestrator: AuthOrchestrator,
}

impl ServiceContext {
    /// Builds every shared component from configuration.
    ///
    /// Connects to the ledger when an endpoint is configured; outside
    /// production a missing endpoint falls back to an in-memory ledger and a
    /// missing broker certificate to a validator that rejects everything.
    pub async fn initialize(settings: &Settings) -> Result<Self, StartupError> {
        let signer = signer_from_hex(settings.signer.method, &settings.signer.private_key_hex)?;
        info!("Issuing credentials as {}", signer.did());

        let validator: Arc<dyn ExternalTokenValidator> = match settings.certificate_pem()? {
            Some(pem) => {
                let validator = CertificateTokenValidator::from_pem(&pem)?;
                match &settings.attestation.audience {
                    Some(audience) => Arc::new(validator.with_audience(audience.clone())),
                    None => Arc::new(validator),
                }
            }
            None => {
                warn!("No trusted certificate configured, attestations can only be accepted with skipExternalCheck");
                Arc::new(UnconfiguredValidator)
            }
        };

        let ledger: Arc<dyn LedgerGateway> = match settings.ledger_endpoint() {
            Some(endpoint) => Arc::new(
                EthereumClient::new(
                    endpoint.rpc_url,
                    endpoint.basic_auth,
                    endpoint.private_key_hex,
                    endpoint.auth_provider_address,
                )
                .await?,
            ),
            None => {
                warn!("No ledger configured, using an in-memory ledger");
                Arc::new(InMemoryLedger::new())
            }
        };

        let mut issuer = CredentialIssuer::new(signer.clone());
        if let Some(validity) = settings.credential_validity() {
            issuer = issuer.with_validity(validity);
        }
        let resolver: Arc<dyn DidResolver> = Arc::new(UniversalResolver::default());
        let verifier = CredentialVerifier::new(resolver).with_clock_skew(settings.credential.clock_skew_secs);

        let orchestrator = AuthOrchestrator::new(settings.production, validator, ledger, verifier.clone(), issuer)
            .with_funding(settings.funding_policy()?)
            .with_timeouts(settings.attestation_timeout(), settings.ledger_timeout());

        Ok(ServiceContext {
            production: settings.production,
            signer,
            verifier,
            orchestrator,
        })
    }

    /// Assembles a context from ready-made components with default policies.
    pub fn from_parts(
        production: bool,
        signer: Arc<dyn Signer>,
        validator: Arc<dyn ExternalTokenValidator>,
        ledger: Arc<dyn LedgerGateway>,
    ) -> Self {
        let verifier = CredentialVerifier::new(Arc::new(UniversalResolver::default()));
        let orchestrator = AuthOrchestrator::new(
            production,
            validator,
            ledger,
            verifier.clone(),
            CredentialIssuer::new(signer.clone()),
        );
        ServiceContext {
            production,
            signer,
            verifier,
            orchestrator,
        }
    }

    pub fn is_production(&self) -> bool {
        self.production
    }

    pub fn issuer_id(&self) -> &str {
        self.signer.did()
    }

    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    pub fn orchestrator(&self) -> &AuthOrchestrator {
        &self.orchestrator
    }

    /// Releases the signer and ledger handles.
    pub fn close(self) {
        info!("Closing service context for {}", self.signer.did());
        drop(self);
    }
}
